pub mod game_api;
