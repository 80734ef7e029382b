pub mod dto;
pub mod event_pusher;
pub mod password;
pub mod repository;
