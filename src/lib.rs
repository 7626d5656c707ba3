//! Conversational invoicing over the Business Messaging API.
//!
//! A business texts or voice-notes a request, the bot parses it, fills in
//! prices from the catalog or asks for them, checks the allowance and the
//! request, creates the invoice and notifies the customer.

pub mod assembly;
pub mod catalog;
pub mod config;
pub mod db;
pub mod handlers;
pub mod issuer;
pub mod messages;
pub mod model;
pub mod nlp;
pub mod notify;
pub mod phone;
pub mod quota;
pub mod services;
pub mod session;
pub mod transcribe;
pub mod webhook;
pub mod whatsapp;
