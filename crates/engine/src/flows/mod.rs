//! One module per business flow; each extends [`crate::engine::Engine`]
//! with its handlers.

mod linking;
mod maintenance;
mod menus;
mod moveout_staff;
mod moveout_tenant;
mod payment;
