//! Todd-Coxeter coset enumeration: decides the word problem for a finitely
//! presented monoid or semigroup by building a deterministic labelled graph
//! whose nodes are congruence classes and whose edges are generators.
//!
//! [`controller::Controller`] is the entry point: construct one from a
//! [`presentation::Presentation`] and a [`presentation::CongruenceKind`],
//! add generating pairs, tune [`settings::Settings`] if the defaults don't
//! fit, then call `run`/`run_for`/`run_until`. Everything else in this
//! crate (the node manager, word graph, coincidence queue, definition
//! buffer, the HLT/Felsch engines, lookahead, strategy scripting,
//! standardisation) is the machinery the controller drives; it is public so
//! that a caller who wants a custom enumeration loop can assemble the same
//! pieces directly, but ordinary use only touches `controller` and
//! `presentation`.
//!
//! This crate never parses presentations from text, never implements
//! Knuth-Bendix or any other rewriting procedure, and never owns a logging
//! backend or a CLI: it is the coset enumeration core, consumed as a
//! library by whatever binds a presentation format and a command surface
//! around it.

pub mod coincidence;
pub mod controller;
pub mod definitions;
pub mod error;
pub mod felsch;
pub mod hlt;
pub mod ids;
pub mod lookahead;
pub mod node_manager;
pub mod presentation;
pub mod report;
pub mod settings;
pub mod standardise;
pub mod strategy;
pub mod table;
pub mod trace;
pub mod word_graph;

pub use controller::{CancelToken, ClassCount, ClassId, Controller};
pub use definitions::DefinitionPolicy;
pub use error::{CongruenceError, Result};
pub use ids::NodeId;
pub use presentation::{CongruenceKind, Generator, GeneratingPairs, Presentation, Word};
pub use settings::{LookaheadExtent, LookaheadStyle, Settings, StandardisationOrder, StrategyKind};
