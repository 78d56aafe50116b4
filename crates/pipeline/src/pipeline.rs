//! Pipeline façade used by live traffic and the importer.

use hitcount_core::limits::{truncate, MAX_LOCATION_LEN, MAX_PATH_LEN, MAX_SIZE_LEN};
use hitcount_core::{campaign, clean_referrer, Hit, PageView, RefScheme, Result};
use hitcount_store::HitStore;
use std::sync::Arc;
use telemetry::metrics;
use tracing::debug;

use crate::buffer::HitBuffer;
use crate::config::PipelineConfig;
use crate::dimension::Dimensions;
use crate::session::{Assignment, Fingerprint, SessionAssigner, SessionHasher, Sha256SessionHasher};
use crate::useragent::{UserAgent, UserAgentResolver};

/// Split a request target into a normalized path and its query string.
///
/// The fragment is dropped, a leading `/` is ensured and the result is
/// truncated to the stored path length.
pub fn normalize_path(target: &str) -> (String, &str) {
    let target = target.split('#').next().unwrap_or_default().trim();
    let (path, query) = target.split_once('?').unwrap_or((target, ""));
    let path = if path.starts_with('/') {
        truncate(path, MAX_PATH_LEN).to_string()
    } else {
        format!("/{}", truncate(path, MAX_PATH_LEN - 1))
    };
    (path, query)
}

/// Ingestion entry point: page views in, buffered hits out.
///
/// Holds the shared state (buffer, sessions, caches) explicitly so that a
/// test can build an isolated instance or [`reset`](Self::reset) one.
pub struct Pipeline {
    store: Arc<dyn HitStore>,
    buffer: Arc<HitBuffer>,
    sessions: SessionAssigner,
    dimensions: Arc<Dimensions>,
    agents: UserAgentResolver,
}

impl Pipeline {
    pub fn new(store: Arc<dyn HitStore>, config: PipelineConfig) -> Self {
        Self::with_hasher(store, config, Arc::new(Sha256SessionHasher))
    }

    pub fn with_hasher(
        store: Arc<dyn HitStore>,
        config: PipelineConfig,
        hasher: Arc<dyn SessionHasher>,
    ) -> Self {
        let dimensions = Arc::new(Dimensions::new(Arc::clone(&store), &config));
        Self {
            buffer: Arc::new(HitBuffer::new()),
            sessions: SessionAssigner::new(&config, hasher),
            agents: UserAgentResolver::new(Arc::clone(&dimensions), &config),
            dimensions,
            store,
        }
    }

    pub fn store(&self) -> &Arc<dyn HitStore> {
        &self.store
    }

    pub fn buffer(&self) -> &Arc<HitBuffer> {
        &self.buffer
    }

    pub fn dimensions(&self) -> &Arc<Dimensions> {
        &self.dimensions
    }

    pub fn sessions(&self) -> &SessionAssigner {
        &self.sessions
    }

    /// Record a page view from live traffic or a text log line.
    ///
    /// The user agent is resolved before the session is assigned, so a
    /// storage error leaves session state untouched.
    pub async fn record(&self, view: PageView) -> Result<Assignment> {
        let (path, query) = normalize_path(&view.path);
        let (referrer, ref_scheme) = match campaign(query) {
            Some(name) => (name, Some(RefScheme::Campaign)),
            None => clean_referrer(&view.referrer),
        };

        let ua = match view.user_agent.as_deref() {
            Some(raw) => self.agents.resolve(raw).await?,
            None => UserAgent::default(),
        };

        let fingerprint = Fingerprint {
            remote_addr: &view.remote_addr,
            user_agent: view.user_agent.as_deref().unwrap_or_default(),
        };
        let assignment = self
            .sessions
            .assign(view.site_id, &fingerprint, &path, view.created_at);

        self.buffer.append(Hit {
            site_id: view.site_id,
            path,
            session: assignment.session,
            bot: ua.bot,
            referrer,
            ref_scheme,
            size: truncate(&view.size, MAX_SIZE_LEN).to_string(),
            location: truncate(&view.location, MAX_LOCATION_LEN).to_string(),
            first_visit: assignment.first_visit,
            browser_id: ua.browser_id,
            system_id: ua.system_id,
            created_at: view.created_at,
        });
        metrics().hits_received.inc();

        Ok(assignment)
    }

    /// Record a hit whose session, first-visit flag and bot code were
    /// computed elsewhere. Only browser and system ids are resolved.
    pub async fn record_verbatim(&self, mut hit: Hit, user_agent: &str) -> Result<()> {
        if !user_agent.trim().is_empty() {
            let ua = self.agents.resolve(user_agent).await?;
            hit.browser_id = ua.browser_id;
            hit.system_id = ua.system_id;
        }
        let (path, _) = normalize_path(&hit.path);
        hit.path = path;

        self.buffer.append(hit);
        metrics().hits_received.inc();
        Ok(())
    }

    /// Clear the buffer, session state and every cache.
    pub fn reset(&self) {
        self.buffer.reset();
        self.sessions.reset();
        self.dimensions.reset();
        self.agents.reset();
        debug!("Pipeline state reset");
    }
}
