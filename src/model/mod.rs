//! Domain types: campaigns, leads, accounts, inbound messages.

pub mod account;
pub mod campaign;
pub mod lead;
pub mod message;

pub use account::Account;
pub use campaign::{Campaign, CampaignStats, CampaignStatus, Schedule, StatField, Step};
pub use lead::{Lead, LeadStatus};
pub use message::{Category, StoredInbound};
