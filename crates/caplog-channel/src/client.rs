//! Channel registry bound to one store connection

use caplog_store::Connection;
use dashmap::DashMap;
use tracing::debug;

use crate::channel::Channel;
use crate::options::ChannelOptions;

/// Hands out one [`Channel`] per name over a shared [`Connection`]
pub struct Client {
    connection: Connection,
    channels: DashMap<String, Channel>,
}

impl Client {
    /// Create a client over a connection
    pub fn new(connection: Connection) -> Self {
        Self {
            connection,
            channels: DashMap::new(),
        }
    }

    /// Get the connection
    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    /// Get or create a channel with default options
    pub fn channel(&self, name: &str) -> Channel {
        self.channel_with_options(name, ChannelOptions::default())
    }

    /// Get or create a channel
    ///
    /// `options` only apply when the channel is created; an existing channel
    /// is returned unchanged.
    pub fn channel_with_options(&self, name: &str, options: ChannelOptions) -> Channel {
        self.channels
            .entry(name.to_string())
            .or_insert_with(|| {
                debug!(channel = name, "Creating channel");
                Channel::new(self.connection.clone(), name, options)
            })
            .clone()
    }

    /// Names of channels created through this client
    pub fn channel_names(&self) -> Vec<String> {
        self.channels.iter().map(|r| r.key().clone()).collect()
    }

    /// Close every channel created through this client
    pub fn close(&self) {
        for channel in self.channels.iter() {
            channel.value().close();
        }
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("connection", &self.connection)
            .field("channels", &self.channel_names())
            .finish()
    }
}
