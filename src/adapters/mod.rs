pub mod auth_http;
pub mod binance_klines;
pub mod connectivity;
pub mod memory;
pub mod postgres;
pub mod record_store;
pub mod session;
pub mod synthetic_feed;

pub use auth_http::HttpSessionProvider;
pub use binance_klines::{BinanceKlineClient, MarketFeed};
pub use connectivity::{AcceptAllConnectivity, ConnectivityCheck, HttpConnectivityCheck};
pub use memory::{MemoryStore, StoreOp};
pub use postgres::PostgresStore;
pub use record_store::RecordStore;
pub use session::{
    MemorySessionProvider, SessionHub, SessionProvider, SessionSubscription,
};
pub use synthetic_feed::SyntheticFeed;
