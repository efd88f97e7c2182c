//! # agentdesk
//!
//! Orchestration server for natural-language task agents.
//!
//! This library provides:
//! - An instruction interpreter that turns free text into typed sub-tasks
//! - A dispatch core that assigns sub-tasks to mock agents and executes
//!   them against abstract external capabilities
//! - HTTP APIs and a per-user WebSocket feed for the dashboard
//!
//! ## Architecture
//!
//! ```text
//!   POST /api/tasks
//!         │
//!         ▼
//!  ┌──────────────┐     ┌──────────────┐
//!  │ Interpreter  │────▶│ Orchestrator │
//!  │ (LLM-backed) │     │ assign/exec  │
//!  └──────────────┘     └──────┬───────┘
//!                              │ fire-and-forget per sub-task
//!              ┌───────────────┼────────────────┐
//!              ▼               ▼                ▼
//!       ┌────────────┐  ┌────────────┐  ┌────────────┐
//!       │ Telephony  │  │  Calendar  │  │   Mailer   │   (mock capabilities)
//!       └────────────┘  └────────────┘  └────────────┘
//!              │               │                │
//!              └──────── store + notifier ──────┘
//!                              │
//!                              ▼
//!                       GET /ws (dashboard)
//! ```
//!
//! ## Task Flow
//! 1. Receive an instruction via API
//! 2. Decompose it into typed steps with a declared execution order
//! 3. Bind each step to an available agent and spawn its execution
//! 4. Stream status transitions and activities to the owning user
//!
//! ## Modules
//! - `interpreter`: natural language -> `InstructionPlan`
//! - `orchestrator`: the assign -> execute -> notify core
//! - `capability`: abstract external services + mock implementations
//! - `notify`: per-user WebSocket fan-out
//! - `store`: pluggable persistence (memory, sqlite)

pub mod agents;
pub mod api;
pub mod capability;
pub mod config;
pub mod interpreter;
pub mod llm;
pub mod notify;
pub mod orchestrator;
pub mod store;
pub mod task;

pub use config::Config;
