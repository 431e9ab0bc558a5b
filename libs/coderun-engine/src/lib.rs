pub mod error;
pub mod executor;
pub mod normalizer;
pub mod remote;
pub mod simulate;

// Re-export the facade surface for the binaries
pub use error::{ExecuteError, TransportError};
pub use executor::{EndpointSource, EnvEndpoints, Executor};
pub use remote::{HttpTransport, RemoteClient, RemoteOutcome, Transport};
