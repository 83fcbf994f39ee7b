//! Prometheus metrics collection and formatting.
//!
//! This module provides metrics in Prometheus text exposition format.

use std::fmt::Write;
use std::sync::Arc;

use tracing::warn;

use crate::state::AppState;

/// Collect all metrics from AppState and format as Prometheus text.
pub async fn collect_metrics(state: &Arc<AppState>) -> String {
    let mut output = String::new();

    collect_stream_metrics(state, &mut output);
    collect_store_metrics(state, &mut output).await;

    output
}

/// Stream sessions by state.
fn collect_stream_metrics(state: &Arc<AppState>, output: &mut String) {
    let open = state.streams.open_count();
    let closed = state.streams.closed_count();

    writeln!(
        output,
        "# HELP parley_streams Generation stream sessions by state"
    )
    .ok();
    writeln!(output, "# TYPE parley_streams gauge").ok();
    writeln!(output, "parley_streams{{state=\"open\"}} {open}").ok();
    writeln!(output, "parley_streams{{state=\"closed\"}} {closed}").ok();
}

/// Stored documents and chats.
async fn collect_store_metrics(state: &Arc<AppState>, output: &mut String) {
    let documents = state.documents.count().await.unwrap_or_else(|e| {
        warn!(error = %e, "Failed to count documents");
        0
    });
    let chats = state.chat_repo.count_chats().await.unwrap_or_else(|e| {
        warn!(error = %e, "Failed to count chats");
        0
    });

    writeln!(output).ok();
    writeln!(output, "# HELP parley_documents_total Stored documents").ok();
    writeln!(output, "# TYPE parley_documents_total gauge").ok();
    writeln!(output, "parley_documents_total {documents}").ok();

    writeln!(output).ok();
    writeln!(output, "# HELP parley_chats_total Stored chats").ok();
    writeln!(output, "# TYPE parley_chats_total gauge").ok();
    writeln!(output, "parley_chats_total {chats}").ok();
}
