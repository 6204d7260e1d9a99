pub mod client;
pub mod config;
pub mod controller;
pub mod fanout;
pub mod future;
pub mod managers;
pub mod registry;
pub mod sampler;
pub mod types;
pub mod utils;

pub use client::{ClientFactory, Http2Client, SpawningClient, Transport};
pub use config::{Arg, ClientConfig, FanoutConfig, FileArg, SamplerConfig};
pub use controller::{Http2Controller, InterruptHandle, SyncSampler, TestElement};
pub use fanout::ResourceFanout;
pub use future::{AbortHandle, RequestOutcome, ResponseCompleter, ResponseFuture};
pub use managers::{
    AuthScheme, AuthSupplier, CacheHandler, CachedResourcePolicy, CookieJar, Credential,
    InMemoryCookieJar,
};
pub use registry::{ConnectionKey, ConnectionRegistry, WorkerContext};
pub use sampler::HttpSampler;
pub use types::*;
pub use utils::*;
