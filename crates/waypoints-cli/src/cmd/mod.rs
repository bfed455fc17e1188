pub mod add;
pub mod baseline;
pub mod config;
pub mod delete;
pub mod done;
pub mod edit;
pub mod export;
pub mod init;
pub mod links;
pub mod list;
pub mod migrate;
pub mod migration_status;
pub mod move_cmd;
pub mod points;
pub mod restore;
pub mod show;
pub mod undo;
