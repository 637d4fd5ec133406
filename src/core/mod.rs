pub mod models;
pub mod process_tree;
pub mod shared_counter;
pub mod spawn_log;
pub mod spawner;
