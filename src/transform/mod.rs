//! Transform adapters from upstream API shapes into presentation models.

pub mod interaction;
