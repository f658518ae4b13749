#[macro_use]
extern crate tracing;

pub mod challenge;
pub mod cluster;
pub mod config;
pub mod dns;
pub mod error;
pub mod repository;
pub mod resolver;
pub mod secrets;

pub use challenge::ChallengeRequest;
pub use error::Error;
pub use resolver::{
    Resolver,
    Solver,
};
