pub mod advisor;
pub mod config;
pub mod error;
pub mod fanout;
pub mod fetch;
pub mod geo;
pub mod locks;
pub mod model;
pub mod output;
pub mod providers;
pub mod reoptimize;
pub mod routes;
pub mod storage;
pub mod synthesis;
