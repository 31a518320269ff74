pub mod market_server;
