//! Query workflows over the terminology, interaction and generation sources.

pub mod alternative;
pub mod chat;
pub mod drug;
pub mod extract;
pub mod history;
pub mod interaction;
