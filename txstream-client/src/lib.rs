//! Async client-side multiplexer for transaction streams.
//!
//! Many independent callers issue requests against one logical transaction
//! carried over a single long-lived bidirectional connection. Requests are
//! coalesced into batched writes; responses come back in transmission order
//! with no correlation id and are routed to the caller that sent the matching
//! request. Built on [Tokio](https://tokio.rs/).
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use txstream_client::{ClientConfig, Request, TransactionClient};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = TransactionClient::new(ClientConfig::default());
//!     let tx = client.connect("127.0.0.1:1729".parse()?).await?;
//!
//!     let answer = tx.execute(Request::from("ping")).await?;
//!     println!("{:?}", answer.body());
//!
//!     tx.close();
//!     client.shutdown();
//!     Ok(())
//! }
//! ```
//!
//! # Architecture
//!
//! | Component | Role |
//! |-----------|------|
//! | [`RequestBatcher`] / [`Dispatcher`] | Per-stream outbound queues flushed by a pool of executors |
//! | [`ResponseListener`] | Routes each inbound payload to the oldest pending collector |
//! | [`SingleResponseCollector`] / [`MultiResponseCollector`] | Per-request result slots |
//! | [`TransactionStream`] | Registers collectors and enqueues requests atomically |
//!
//! # Configuration
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use txstream_client::ClientConfig;
//!
//! let config = ClientConfig::builder()
//!     .batch(|b| b
//!         .batch_window(Duration::from_millis(1))
//!         .sustained_batch_window(Duration::from_millis(3))
//!         .executor_count(4)
//!         .max_batch_size(500))
//!     .collector_wait_timeout(Duration::from_secs(1))
//!     .response_timeout(Duration::from_secs(30))
//!     .build()
//!     .expect("invalid config");
//! ```
//!
//! Configuration can also be read from the environment with
//! [`ClientConfig::from_env`], or from YAML/TOML files with the
//! `config-file` feature.

#![warn(missing_docs)]

pub mod client;
pub mod config;
pub mod config_file;
pub mod connection;
pub mod dispatch;
pub mod stream;
pub mod transaction;

pub use client::TransactionClient;
pub use config::{BatchConfig, BatchConfigBuilder, ClientConfig, ClientConfigBuilder, ConfigError};
pub use config_file::{FileBatchConfig, FileConfig};
pub use connection::{ChannelSink, ConnectionId, RequestSink, ResponseObserver};
pub use dispatch::{Dispatcher, RequestBatcher};
pub use stream::{
    MultiResponseCollector, Response, ResponseCollector, ResponseListener, ResponseParts,
    ResponseType, SingleResponse, SingleResponseCollector,
};
pub use transaction::{ResponseStream, TransactionStream};
pub use txstream_core::{ErrorCause, Payload, Request, RequestBatch, Result, TxStreamError};

#[cfg(feature = "config-file")]
pub use config_file::load_config;
