//! Loanflow server library
//!
//! Loan origination workflow: proposal, field-validated approval,
//! crowd-funded investment and disbursement, exposed over an axum API.

pub mod config;
pub mod coordination;
pub mod db;
pub mod documents;
pub mod error;
pub mod handlers;
pub mod loan;
pub mod memory;
pub mod middleware;
pub mod models;
pub mod notification;
pub mod routes;
pub mod state;
