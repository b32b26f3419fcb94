pub mod agent;
pub mod attachments;
pub mod context;
pub mod conversation;
pub mod errors;
pub mod events;
pub mod handler;
pub mod models;
pub mod prompt_template;
pub mod protocol;
pub mod providers;
pub mod storage;
pub mod tools;
pub mod translator;
