use tender_core::{
    AppViewModel, AttemptState, Deferred, Freshness, RegionState, ResultSnapshot, Stage,
};

/// One-line status for the running search; empty when there is nothing to show.
pub fn progress_line(view: &AppViewModel) -> String {
    let Some(search_id) = view.search_id.as_deref() else {
        return String::new();
    };

    if let Some(countdown) = &view.countdown {
        return format!(
            "[{}] retrying in {}s (automatic retry {} of {})",
            search_id, countdown.remaining_secs, countdown.retry_number, countdown.max_retries
        );
    }

    let mut line = format!(
        "[{}] {} {:>3}% {}s/~{}s",
        search_id,
        phase_label(view),
        view.progress,
        view.elapsed_secs,
        view.estimate_secs
    );
    if view.overtime {
        line.push_str(" (taking longer than usual)");
    }
    if !view.regions.is_empty() {
        let done = view
            .regions
            .iter()
            .filter(|row| row.state.is_terminal())
            .count();
        line.push_str(&format!(
            " | regions {}/{} | found {}",
            done,
            view.regions.len(),
            format_with_commas(view.total_found)
        ));
    }
    if let Some(batch) = &view.batch {
        line.push_str(&format!(" | batch {}/{}", batch.batch, batch.total_batches));
    }
    if view.polling {
        line.push_str(" | polling");
    }
    if view.immediate_retries > 0 {
        line.push_str(&format!(" | server retry {}", view.immediate_retries));
    }
    if !view.message.is_empty() && matches!(view.phase, AttemptState::Submitting | AttemptState::Active) {
        line.push_str(" | ");
        line.push_str(&view.message);
    }
    line
}

fn phase_label(view: &AppViewModel) -> &'static str {
    match view.phase {
        AttemptState::Idle => "idle",
        AttemptState::Submitting => "submitting",
        AttemptState::Active => match view.stage {
            Some(Stage::Connecting) | None => "connecting",
            Some(Stage::Fetching) => "fetching",
            Some(Stage::Filtering) => "filtering",
            Some(Stage::Summarizing) => "summarizing",
            Some(Stage::Exporting) => "exporting",
            Some(Stage::Complete) => "complete",
            Some(Stage::Degraded) => "degraded",
        },
        AttemptState::Retrying => "waiting to retry",
        AttemptState::Succeeded => "done",
        AttemptState::Failed => "failed",
        AttemptState::Cancelled => "cancelled",
    }
}

/// Multi-line report printed once the search settles.
pub fn final_report(view: &AppViewModel) -> String {
    let mut lines = Vec::new();

    if let Some(result) = &view.result {
        lines.extend(result_lines(result));
    }
    if !view.regions.is_empty() {
        let failed: Vec<&str> = view
            .regions
            .iter()
            .filter(|row| row.state == RegionState::Failed)
            .map(|row| row.region.as_str())
            .collect();
        if !failed.is_empty() {
            lines.push(format!("Regions without results: {}", failed.join(", ")));
        }
    }
    for notice in &view.notices {
        lines.push(format!("Note: {}", notice.message));
    }
    if let Some(error) = &view.error {
        let mut line = format!("Error: {}", error.message);
        if let Some(search_id) = &error.search_id {
            line.push_str(&format!(" (reference {search_id})"));
        }
        lines.push(line);
        if let Some(secs) = error.manual_cooldown_secs {
            lines.push(format!("You can try again in {secs}s with `tender repeat`."));
        }
    }
    if lines.is_empty() {
        lines.push("No results to show.".to_string());
    }
    lines.join("\n")
}

fn result_lines(result: &ResultSnapshot) -> Vec<String> {
    let freshness = match result.freshness {
        Freshness::Live => "live".to_string(),
        Freshness::Cached => match result.cache_age_secs {
            Some(age) => format!("cached {} min ago", age / 60),
            None => "cached".to_string(),
        },
        Freshness::Degraded => "incomplete: some sources failed".to_string(),
        Freshness::Partial => "partial".to_string(),
    };
    let mut lines = vec![format!(
        "{} matching notices ({} scanned, {})",
        format_with_commas(result.filtered_count),
        format_with_commas(result.raw_count),
        freshness
    )];
    if !result.sources.is_empty() {
        lines.push(format!("Sources: {}", result.sources.join(", ")));
    }
    lines.push(match &result.summary {
        Deferred::Ready(text) => format!("Summary: {text}"),
        Deferred::Pending => "Summary: still being written".to_string(),
        Deferred::Failed => "Summary: unavailable".to_string(),
    });
    lines.push(match &result.export {
        Deferred::Ready(reference) => format!("Export: {reference}"),
        Deferred::Pending => "Export: still being generated".to_string(),
        Deferred::Failed => "Export: unavailable".to_string(),
    });
    lines
}

fn format_with_commas(value: u64) -> String {
    let s = value.to_string();
    let mut out = String::with_capacity(s.len() + s.len() / 3);
    for (idx, ch) in s.chars().enumerate() {
        if idx > 0 && (s.len() - idx) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}
