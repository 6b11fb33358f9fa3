pub mod backend;
pub mod config;
pub mod error;
pub mod io_struct;
pub mod logging;
pub mod metrics;
pub mod proxy_state;
pub mod request_id;
pub mod router;
pub mod server;

pub use config::{DeliveryMode, ProxyConfig, ProxyMode};
pub use error::{ProxyError, ProxyResult};
pub use proxy_state::ProxyState;
