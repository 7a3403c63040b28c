pub mod config_cmd;
pub mod quota;
pub mod serve;
pub mod token;
