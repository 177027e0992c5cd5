//! HTTP surface: dashboard chat/health/notifications, OpenAI-compatible
//! completions, inbound webhooks, and the static dashboard shell.

pub mod chat;
pub mod health;
pub mod notifications;
pub mod openai_compat;
pub mod ui;
pub mod webhooks;
