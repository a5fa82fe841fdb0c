use std::path::Path;

use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tender_core::{
    Deferred, Freshness, ResultSnapshot, SearchMode, SearchRequest, SessionSnapshot, SortOrder,
};
use tender_engine::AtomicFileWriter;
use tender_logging::{tender_error, tender_info, tender_warn};

const STATE_FILENAME: &str = ".tender_state.ron";
const DATE_FORMAT: &str = "%Y-%m-%d";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct PersistedRequest {
    regions: Vec<String>,
    date_from: String,
    date_to: String,
    mode: PersistedMode,
    sector_or_keywords: String,
    status: Option<String>,
    modality_codes: Vec<u32>,
    value_min: Option<u64>,
    value_max: Option<u64>,
    jurisdiction_levels: Vec<String>,
    municipality_codes: Vec<String>,
    sort: PersistedSort,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
enum PersistedMode {
    Sector,
    Keywords,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
enum PersistedSort {
    Relevance,
    NewestFirst,
    ClosingSoon,
    HighestValue,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
enum PersistedFreshness {
    Live,
    Cached,
    Degraded,
    Partial,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
enum PersistedArtifact {
    Pending,
    Ready(String),
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct PersistedResult {
    raw_count: u64,
    filtered_count: u64,
    freshness: PersistedFreshness,
    sources: Vec<String>,
    summary: PersistedArtifact,
    export: PersistedArtifact,
    cache_age_secs: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct PersistedSuccess {
    request: PersistedRequest,
    result: PersistedResult,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
struct PersistedState {
    saved_utc: Option<String>,
    last_request: Option<PersistedRequest>,
    last_success: Option<PersistedSuccess>,
}

pub(crate) fn load_session(state_dir: &Path) -> SessionSnapshot {
    let writer = AtomicFileWriter::new(state_dir.to_path_buf());
    let path = writer.path_of(STATE_FILENAME);
    let content = match writer.read_optional(STATE_FILENAME) {
        Ok(Some(text)) => text,
        Ok(None) => return SessionSnapshot::default(),
        Err(err) => {
            tender_warn!("Failed to read persisted state from {:?}: {}", path, err);
            return SessionSnapshot::default();
        }
    };

    let state: PersistedState = match ron::from_str(&content) {
        Ok(state) => state,
        Err(err) => {
            tender_warn!("Failed to parse persisted state from {:?}: {}", path, err);
            return SessionSnapshot::default();
        }
    };

    let last_request = state.last_request.and_then(restore_request);
    let last_success = state.last_success.and_then(|success| {
        let request = restore_request(success.request)?;
        Some((request, restore_result(success.result)))
    });

    tender_info!(
        "Loaded persisted session from {:?} (saved {})",
        path,
        state.saved_utc.as_deref().unwrap_or("at an unknown time")
    );
    SessionSnapshot {
        last_request,
        last_success,
    }
}

pub(crate) fn save_session(state_dir: &Path, snapshot: &SessionSnapshot) {
    let state = PersistedState {
        saved_utc: Some(Utc::now().to_rfc3339()),
        last_request: snapshot.last_request.as_ref().map(persist_request),
        last_success: snapshot
            .last_success
            .as_ref()
            .map(|(request, result)| PersistedSuccess {
                request: persist_request(request),
                result: persist_result(result),
            }),
    };

    let pretty = ron::ser::PrettyConfig::new();
    let content = match ron::ser::to_string_pretty(&state, pretty) {
        Ok(text) => text,
        Err(err) => {
            tender_error!("Failed to serialize persisted state: {}", err);
            return;
        }
    };

    let writer = AtomicFileWriter::new(state_dir.to_path_buf());
    if let Err(err) = writer.write(STATE_FILENAME, &content) {
        tender_error!("Failed to write persisted state to {:?}: {}", state_dir, err);
    }
}

fn persist_request(request: &SearchRequest) -> PersistedRequest {
    PersistedRequest {
        regions: request.regions.clone(),
        date_from: request.date_from.format(DATE_FORMAT).to_string(),
        date_to: request.date_to.format(DATE_FORMAT).to_string(),
        mode: match request.mode {
            SearchMode::Sector => PersistedMode::Sector,
            SearchMode::Keywords => PersistedMode::Keywords,
        },
        sector_or_keywords: request.sector_or_keywords.clone(),
        status: request.status.clone(),
        modality_codes: request.modality_codes.clone(),
        value_min: request.value_min,
        value_max: request.value_max,
        jurisdiction_levels: request.jurisdiction_levels.clone(),
        municipality_codes: request.municipality_codes.clone(),
        sort: match request.sort {
            SortOrder::Relevance => PersistedSort::Relevance,
            SortOrder::NewestFirst => PersistedSort::NewestFirst,
            SortOrder::ClosingSoon => PersistedSort::ClosingSoon,
            SortOrder::HighestValue => PersistedSort::HighestValue,
        },
    }
}

fn restore_request(persisted: PersistedRequest) -> Option<SearchRequest> {
    let parse = |text: &str| match NaiveDate::parse_from_str(text, DATE_FORMAT) {
        Ok(date) => Some(date),
        Err(err) => {
            tender_warn!("Ignoring persisted request with bad date {:?}: {}", text, err);
            None
        }
    };
    let date_from = parse(&persisted.date_from)?;
    let date_to = parse(&persisted.date_to)?;
    let mut request = SearchRequest::new(persisted.regions, date_from, date_to);
    request.mode = match persisted.mode {
        PersistedMode::Sector => SearchMode::Sector,
        PersistedMode::Keywords => SearchMode::Keywords,
    };
    request.sector_or_keywords = persisted.sector_or_keywords;
    request.status = persisted.status;
    request.modality_codes = persisted.modality_codes;
    request.value_min = persisted.value_min;
    request.value_max = persisted.value_max;
    request.jurisdiction_levels = persisted.jurisdiction_levels;
    request.municipality_codes = persisted.municipality_codes;
    request.sort = match persisted.sort {
        PersistedSort::Relevance => SortOrder::Relevance,
        PersistedSort::NewestFirst => SortOrder::NewestFirst,
        PersistedSort::ClosingSoon => SortOrder::ClosingSoon,
        PersistedSort::HighestValue => SortOrder::HighestValue,
    };
    Some(request)
}

fn persist_result(result: &ResultSnapshot) -> PersistedResult {
    let artifact = |deferred: &Deferred| match deferred {
        Deferred::Pending => PersistedArtifact::Pending,
        Deferred::Ready(value) => PersistedArtifact::Ready(value.clone()),
        Deferred::Failed => PersistedArtifact::Failed,
    };
    PersistedResult {
        raw_count: result.raw_count,
        filtered_count: result.filtered_count,
        freshness: match result.freshness {
            Freshness::Live => PersistedFreshness::Live,
            Freshness::Cached => PersistedFreshness::Cached,
            Freshness::Degraded => PersistedFreshness::Degraded,
            Freshness::Partial => PersistedFreshness::Partial,
        },
        sources: result.sources.clone(),
        summary: artifact(&result.summary),
        export: artifact(&result.export),
        cache_age_secs: result.cache_age_secs,
    }
}

fn restore_result(persisted: PersistedResult) -> ResultSnapshot {
    // Nothing from an earlier run will complete a pending artifact.
    let artifact = |artifact: PersistedArtifact| match artifact {
        PersistedArtifact::Ready(value) => Deferred::Ready(value),
        PersistedArtifact::Pending | PersistedArtifact::Failed => Deferred::Failed,
    };
    ResultSnapshot {
        raw_count: persisted.raw_count,
        filtered_count: persisted.filtered_count,
        freshness: match persisted.freshness {
            PersistedFreshness::Live => Freshness::Live,
            PersistedFreshness::Cached => Freshness::Cached,
            PersistedFreshness::Degraded => Freshness::Degraded,
            PersistedFreshness::Partial => Freshness::Partial,
        },
        sources: persisted.sources,
        summary: artifact(persisted.summary),
        export: artifact(persisted.export),
        live_fetch_in_progress: false,
        cache_age_secs: persisted.cache_age_secs,
    }
}
