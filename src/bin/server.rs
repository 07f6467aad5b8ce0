//! Hybrid RAG server binary.
//! Run with: cargo run --bin hybrid-rag-server

use std::process::ExitCode;

use hybrid_rag::start_hybrid_rag;

fn main() -> ExitCode {
    start_hybrid_rag::run()
}
