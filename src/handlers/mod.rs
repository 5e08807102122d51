pub mod rest;
pub mod ws;

pub use rest::{create_game_handler, get_game_handler, start_caller_handler, verify_winner_handler};
pub use ws::websocket_handler;
