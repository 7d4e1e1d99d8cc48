pub mod create;
pub mod get_full_list;
pub mod get_one;
pub mod update;
