//! Replication feed client
//!
//! The feed publishes one batch per fixed period at two granularities:
//! coarse (hourly) for catch-up and fine (minutely) once near real time.
//! The head of each stream is advertised in `state.txt` as a sequence
//! number plus a timestamp; batch files hang off the same base URL using
//! the zero-padded sequence path scheme (see `fetch`).

use chrono::{DateTime, Duration, Utc};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReplicationGranularity {
    Coarse,
    Fine,
}

impl ReplicationGranularity {
    /// Directory name used for the local cache and in logs
    pub fn as_str(&self) -> &'static str {
        match self {
            ReplicationGranularity::Coarse => "hour",
            ReplicationGranularity::Fine => "minute",
        }
    }

    /// Fixed batch period of the stream
    pub fn period_secs(&self) -> i64 {
        match self {
            ReplicationGranularity::Coarse => 60 * 60,
            ReplicationGranularity::Fine => 60,
        }
    }
}

/// Feed cursor identifying one batch of elementary edits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplicationPosition {
    pub granularity: ReplicationGranularity,
    pub sequence: u64,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
}

/// Head of one replication stream as advertised by `state.txt`
#[derive(Debug, Clone, Copy)]
pub struct FeedState {
    pub sequence: u64,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug)]
pub enum FeedError {
    Http(reqwest::Error),
    MalformedState(String),
}

impl From<reqwest::Error> for FeedError {
    fn from(err: reqwest::Error) -> Self {
        FeedError::Http(err)
    }
}

impl std::fmt::Display for FeedError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FeedError::Http(e) => write!(f, "feed request failed: {}", e),
            FeedError::MalformedState(e) => write!(f, "malformed state file: {}", e),
        }
    }
}

impl std::error::Error for FeedError {}

/// Read-only client for the two replication streams
pub struct ReplicationFeed {
    client: reqwest::Client,
    coarse_url: String,
    fine_url: String,
}

impl ReplicationFeed {
    pub fn new(coarse_url: String, fine_url: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            coarse_url,
            fine_url,
        }
    }

    pub fn base_url(&self, granularity: ReplicationGranularity) -> &str {
        match granularity {
            ReplicationGranularity::Coarse => &self.coarse_url,
            ReplicationGranularity::Fine => &self.fine_url,
        }
    }

    /// Fetch and parse the stream head from `state.txt`
    pub async fn head_state(
        &self,
        granularity: ReplicationGranularity,
    ) -> Result<FeedState, FeedError> {
        let url = format!("{}/state.txt", self.base_url(granularity).trim_end_matches('/'));
        let text = self
            .client
            .get(&url)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;
        parse_state(&text)
    }

    /// Build an enumerator whose first position covers `since`
    ///
    /// The stream has a fixed period, so the starting sequence is the
    /// head sequence stepped back by the elapsed time since `since`.
    pub async fn enumerator_from(
        &self,
        granularity: ReplicationGranularity,
        since: DateTime<Utc>,
    ) -> Result<ReplicationEnumerator, FeedError> {
        let head = self.head_state(granularity).await?;
        let period = granularity.period_secs();
        let elapsed = (head.timestamp - since).num_seconds().max(0);
        let steps = (elapsed + period - 1) / period;
        let next_sequence = head.sequence.saturating_sub(steps as u64);

        log::info!(
            "Resuming {} stream at sequence {} (head {}, since {})",
            granularity.as_str(),
            next_sequence,
            head.sequence,
            since
        );

        Ok(ReplicationEnumerator {
            granularity,
            next_sequence,
            head,
        })
    }
}

/// Sequential cursor over one stream's positions
///
/// `move_next` re-reads the stream head once before reporting
/// end-of-stream, so a caught-up enumerator picks up freshly published
/// batches on the next drain.
#[derive(Debug)]
pub struct ReplicationEnumerator {
    granularity: ReplicationGranularity,
    next_sequence: u64,
    head: FeedState,
}

impl ReplicationEnumerator {
    pub fn granularity(&self) -> ReplicationGranularity {
        self.granularity
    }

    pub async fn move_next(
        &mut self,
        feed: &ReplicationFeed,
    ) -> Result<Option<ReplicationPosition>, FeedError> {
        if self.next_sequence > self.head.sequence {
            self.head = feed.head_state(self.granularity).await?;
            if self.next_sequence > self.head.sequence {
                return Ok(None);
            }
        }
        let position = self.position_for(self.next_sequence);
        self.next_sequence += 1;
        Ok(Some(position))
    }

    /// Batch timestamps derived from the head under the fixed period
    fn position_for(&self, sequence: u64) -> ReplicationPosition {
        let behind = (self.head.sequence - sequence) as i64;
        let period = Duration::seconds(self.granularity.period_secs());
        let end_time = self.head.timestamp - Duration::seconds(self.granularity.period_secs() * behind);
        ReplicationPosition {
            granularity: self.granularity,
            sequence,
            start_time: end_time - period,
            end_time,
        }
    }
}

/// Parse a `state.txt` document (`key=value` lines, `\:` escapes)
fn parse_state(text: &str) -> Result<FeedState, FeedError> {
    let mut sequence = None;
    let mut timestamp = None;

    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        match key.trim() {
            "sequenceNumber" => {
                sequence = Some(value.trim().parse::<u64>().map_err(|_| {
                    FeedError::MalformedState(format!("bad sequenceNumber: {}", value))
                })?);
            }
            "timestamp" => {
                let unescaped = value.trim().replace("\\:", ":");
                let parsed = DateTime::parse_from_rfc3339(&unescaped).map_err(|_| {
                    FeedError::MalformedState(format!("bad timestamp: {}", value))
                })?;
                timestamp = Some(parsed.with_timezone(&Utc));
            }
            _ => {}
        }
    }

    match (sequence, timestamp) {
        (Some(sequence), Some(timestamp)) => Ok(FeedState {
            sequence,
            timestamp,
        }),
        _ => Err(FeedError::MalformedState(
            "missing sequenceNumber or timestamp".to_string(),
        )),
    }
}
