pub mod clients;
pub mod commands;
pub mod config;
pub mod error;
pub mod labels;
pub mod mutation;
pub mod orchestrator;
pub mod provider;
pub mod repo;
pub mod schema;
pub mod secrets;
pub mod workspace;

mod app;

// Re-export the types main needs
pub use app::App;
pub use config::Config;
pub use error::Error;
pub use provider::Provider;
pub use repo::RepositoryReference;

// Disable colors for all tests to get clean output
#[cfg(test)]
#[ctor::ctor]
fn init_tests() {
    colored::control::set_override(false);
}
