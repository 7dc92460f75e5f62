mod db;
mod migrations;
pub mod utils;
