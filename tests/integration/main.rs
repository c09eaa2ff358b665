//! Integration tests — end-to-end optimization flow against mock sources.

mod mock_source;
mod optimize_flow;
