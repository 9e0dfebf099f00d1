//! Domain model module declarations.

pub mod attempt;
pub mod event;
pub mod failure;
pub mod identity;
pub mod page_state;
pub mod run;
