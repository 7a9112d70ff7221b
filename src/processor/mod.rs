pub mod action_processor;
pub mod progress_engine;
pub mod tour_sequencer;
