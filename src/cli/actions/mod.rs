pub mod server;

use crate::cli::config::ServerConfig;

#[derive(Debug)]
pub enum Action {
    Server { config: ServerConfig },
}
