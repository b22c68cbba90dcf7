pub mod connection;

pub use connection::get_connection_with_metrics;
