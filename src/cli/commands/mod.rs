pub mod config;
pub mod overrides;
pub mod profile;
pub mod run;
pub mod saves;
