//! Infrastructure adapters for application ports.

#![forbid(unsafe_code)]

mod http_forwarding_transport;
mod in_memory_coordination_store;
mod redis_coordination_store;

pub use http_forwarding_transport::HttpForwardingTransport;
pub use in_memory_coordination_store::InMemoryCoordinationStore;
pub use redis_coordination_store::RedisCoordinationStore;
