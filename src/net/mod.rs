pub mod client;
pub mod framing;
pub mod protocol;
pub mod provider;

#[cfg(feature = "server")]
pub mod limits;
#[cfg(feature = "server")]
pub mod server;
