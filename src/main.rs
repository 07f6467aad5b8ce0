//! Binary entrypoint that launches the hybrid RAG server.

use std::process::ExitCode;

use hybrid_rag::start_hybrid_rag;

/// Start the server, making sure a local Ollama is running first.
fn main() -> ExitCode {
    start_hybrid_rag::run()
}
