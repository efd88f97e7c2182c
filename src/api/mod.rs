//! HTTP API for the agentdesk server.
//!
//! ## Endpoints
//!
//! - `GET  /api/health` - Health check
//! - `GET  /api/agents` - List the agent roster
//! - `POST /api/tasks` - Submit a natural-language instruction
//! - `GET  /api/tasks` - List the caller's tasks
//! - `GET  /api/tasks/{id}` - Get one task with its sub-tasks
//! - `GET  /api/activities` - Recent activity feed
//! - `GET  /api/integrations` - External service status rows
//! - `GET  /api/examples` - Quick example instructions
//! - `GET  /api/stats` - Task counters and success rate
//! - `GET  /ws` - Dashboard WebSocket (real-time updates)
//!
//! Caller identity is the opaque `x-user-id` header; authentication itself
//! happens upstream of this service.

mod routes;
mod types;
mod ws;

pub use routes::serve;
pub use types::*;
