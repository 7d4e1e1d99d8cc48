pub mod auth;
pub mod crud;
pub mod files;
pub mod realtime;
