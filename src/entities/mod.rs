pub mod dispute;
pub mod game_match;
pub mod payment_record;
pub mod tournament;
pub mod tournament_participant;
pub mod transaction;
pub mod user;
pub mod webhook_log;
