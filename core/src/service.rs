//! The proof service: the one entry point for reading and changing a proof.
//!
//! Every write follows the same path. The service opens a write transaction
//! on the ledger, brings its cached state up to date with everything already
//! committed, runs the relevant gate check against that state, and appends
//! the resulting events before the transaction ends. A failed check appends
//! nothing.
//!
//! Identifiers cross this boundary in textual form (`"1.2.3"`, `"alice"`)
//! and are parsed here; malformed input fails before the ledger is touched.

use std::fs;
use std::io::ErrorKind as IoErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use vetted_config::{ConfigError, PROOF_CONFIG_FILE, ProofConfig};
use vetted_ledger::{Ledger, LedgerEntry, LedgerError, LedgerOptions, Seq};
use vetted_types::{
    AgentId, ChallengeId, ChallengeTarget, DefinitionName, Event, NodeId, NonEmptyString,
    Severity,
};

use crate::bulk::{Created, plan_acceptance, plan_refinement};
use crate::cache::{StateCache, fold_entries};
use crate::clock::{Clock, SystemClock};
use crate::error::ProofError;
use crate::gate::{
    AcceptOptions, Acceptance, NewChallenge, NodeSpec, check_acceptance, check_challenge,
    check_creation, check_definition, check_refutation, check_resolution, require_pending,
};
use crate::lease::{check_claim, check_release, lease_length};
use crate::state::{Lease, State};

/// File name of the event ledger inside a proof directory.
pub const LEDGER_FILE: &str = "ledger.db";

/// A challenge as a caller raises it, identifiers in textual form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChallengeSpec {
    pub id: String,
    pub node: String,
    pub target: ChallengeTarget,
    pub severity: Severity,
    pub reason: String,
    pub raised_by: Option<String>,
}

impl ChallengeSpec {
    pub fn new(
        id: impl Into<String>,
        node: impl Into<String>,
        target: ChallengeTarget,
        severity: Severity,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            node: node.into(),
            target,
            severity,
            reason: reason.into(),
            raised_by: None,
        }
    }

    pub fn raised_by(mut self, agent: impl Into<String>) -> Self {
        self.raised_by = Some(agent.into());
        self
    }

    fn resolve(&self) -> Result<NewChallenge, ProofError> {
        Ok(NewChallenge {
            id: ChallengeId::new(self.id.as_str())?,
            node: NodeId::parse(&self.node)?,
            target: self.target,
            reason: non_empty(&self.reason, "challenge reason")?,
            severity: self.severity,
            raised_by: self.raised_by.as_deref().map(AgentId::new).transpose()?,
        })
    }
}

pub struct ProofService<C: Clock = SystemClock> {
    dir: Option<PathBuf>,
    ledger: Ledger,
    config: ProofConfig,
    clock: C,
    cache: StateCache,
}

impl ProofService<SystemClock> {
    /// Create a proof in `dir` using the user's default configuration.
    pub fn init(dir: impl AsRef<Path>, conjecture: &str, author: &str) -> Result<Self, ProofError> {
        Self::init_with(
            dir,
            conjecture,
            author,
            ProofConfig::load_user_defaults(),
            SystemClock,
        )
    }

    /// Open the proof in `dir`. Never creates one.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self, ProofError> {
        Self::open_with(dir, SystemClock)
    }
}

impl<C: Clock> ProofService<C> {
    /// Create the proof directory, record the conjecture, and fix its configuration.
    ///
    /// Fails with [`ProofError::AlreadyInitialized`] if `dir` already holds a proof.
    /// A failed initialization removes the ledger it created, so the call can be retried.
    pub fn init_with(
        dir: impl AsRef<Path>,
        conjecture: &str,
        author: &str,
        config: ProofConfig,
        clock: C,
    ) -> Result<Self, ProofError> {
        let dir = dir.as_ref();
        let conjecture = non_empty(conjecture, "conjecture")?;
        let author = AgentId::new(author)?;
        config.validate()?;

        if dir.join(PROOF_CONFIG_FILE).exists() {
            return Err(ProofError::AlreadyInitialized(dir.to_path_buf()));
        }
        fs::create_dir_all(dir).map_err(|e| {
            ProofError::io(
                format!("Failed to create proof directory: {}", dir.display()),
                e,
            )
        })?;

        let ledger_path = dir.join(LEDGER_FILE);
        let created = !ledger_path.exists();
        match Self::initialize_in(dir, &ledger_path, conjecture, author, config, clock) {
            Ok(service) => {
                info!(dir = %dir.display(), "Initialized proof");
                Ok(service)
            }
            Err(err) => {
                if created && !matches!(err, ProofError::AlreadyInitialized(_)) {
                    remove_ledger_files(&ledger_path);
                }
                Err(err)
            }
        }
    }

    /// The proof.toml write comes last: its presence marks a complete proof.
    fn initialize_in(
        dir: &Path,
        ledger_path: &Path,
        conjecture: NonEmptyString,
        author: AgentId,
        config: ProofConfig,
        clock: C,
    ) -> Result<Self, ProofError> {
        let ledger = Ledger::create(ledger_path, ledger_options(&config))?;
        let mut service = Self {
            dir: Some(dir.to_path_buf()),
            ledger,
            config,
            clock,
            cache: StateCache::default(),
        };
        service.record_initialization(conjecture, author)?;
        match config.write_to_dir(dir) {
            Ok(_) => Ok(service),
            Err(ConfigError::Io { source, .. }) if source.kind() == IoErrorKind::AlreadyExists => {
                Err(ProofError::AlreadyInitialized(dir.to_path_buf()))
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Open the proof in `dir`. Never creates one.
    ///
    /// A directory without a configuration file or whose ledger has no
    /// recorded conjecture is reported as [`ProofError::NotInitialized`].
    pub fn open_with(dir: impl AsRef<Path>, clock: C) -> Result<Self, ProofError> {
        let dir = dir.as_ref();
        let ledger_path = dir.join(LEDGER_FILE);
        if !ledger_path.is_file() || !dir.join(PROOF_CONFIG_FILE).is_file() {
            return Err(ProofError::NotInitialized(dir.to_path_buf()));
        }
        let config = ProofConfig::read_from_dir(dir)?;
        let ledger = match Ledger::open(&ledger_path, ledger_options(&config)) {
            Ok(ledger) => ledger,
            Err(LedgerError::NotFound(_)) => {
                return Err(ProofError::NotInitialized(dir.to_path_buf()));
            }
            Err(err) => return Err(err.into()),
        };
        if ledger.last_seq()? == 0 {
            return Err(ProofError::NotInitialized(dir.to_path_buf()));
        }
        debug!(dir = %dir.display(), "Opened proof");
        Ok(Self {
            dir: Some(dir.to_path_buf()),
            ledger,
            config,
            clock,
            cache: StateCache::default(),
        })
    }

    /// A proof backed by an in-memory ledger (for testing)
    pub fn in_memory(
        conjecture: &str,
        author: &str,
        config: ProofConfig,
        clock: C,
    ) -> Result<Self, ProofError> {
        let conjecture = non_empty(conjecture, "conjecture")?;
        let author = AgentId::new(author)?;
        config.validate()?;
        let mut service = Self {
            dir: None,
            ledger: Ledger::open_in_memory()?,
            config,
            clock,
            cache: StateCache::default(),
        };
        service.record_initialization(conjecture, author)?;
        Ok(service)
    }

    fn record_initialization(
        &mut self,
        conjecture: NonEmptyString,
        author: AgentId,
    ) -> Result<(), ProofError> {
        let dir = self.dir.clone().unwrap_or_default();
        self.commit("init", move |state, _now| {
            if state.event_count() > 0 {
                return Err(ProofError::AlreadyInitialized(dir));
            }
            Ok((vec![Event::ProofInitialized { conjecture, author }], ()))
        })
    }

    #[must_use]
    pub fn config(&self) -> &ProofConfig {
        &self.config
    }

    /// The proof directory; `None` for an in-memory proof.
    #[must_use]
    pub fn dir(&self) -> Option<&Path> {
        self.dir.as_deref()
    }

    #[must_use]
    pub fn clock(&self) -> &C {
        &self.clock
    }

    #[must_use]
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    // ------------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------------

    /// Current state of the proof, including everything committed so far by any process.
    pub fn load_state(&self) -> Result<Arc<State>, ProofError> {
        self.cache.load(&self.ledger)
    }

    /// Replay the whole ledger from scratch, bypassing the cache.
    pub fn verify(&self) -> Result<State, ProofError> {
        let entries = self.ledger.read_all()?;
        let mut state = State::default();
        fold_entries(&mut state, &entries)?;
        info!(events = state.event_count(), "Ledger verified");
        Ok(state)
    }

    /// Committed entries with sequence numbers greater than `after`.
    pub fn events_since(&self, after: Seq) -> Result<Vec<LedgerEntry>, ProofError> {
        Ok(self.ledger.read_since(after)?)
    }

    // ------------------------------------------------------------------------
    // Leases
    // ------------------------------------------------------------------------

    /// Claim `id` for `owner`, for `duration` or the proof's default lease.
    pub fn claim_node(
        &mut self,
        id: &str,
        owner: &str,
        duration: Option<Duration>,
    ) -> Result<Lease, ProofError> {
        let id = NodeId::parse(id)?;
        let owner = AgentId::new(owner)?;
        let length = lease_length(duration.unwrap_or_else(|| self.config.default_lease()))?;
        self.commit("claim", |state, now| {
            let (event, lease) = check_claim(state, &id, &owner, now, length)?;
            Ok((vec![event], lease))
        })
    }

    pub fn release_node(&mut self, id: &str, owner: &str) -> Result<(), ProofError> {
        let id = NodeId::parse(id)?;
        let owner = AgentId::new(owner)?;
        self.commit("release", |state, now| {
            Ok((vec![check_release(state, &id, &owner, now)?], ()))
        })
    }

    // ------------------------------------------------------------------------
    // Creation
    // ------------------------------------------------------------------------

    /// Create a node with an explicit identifier under its (claimed) parent.
    pub fn create_node(
        &mut self,
        id: &str,
        owner: &str,
        spec: &NodeSpec,
    ) -> Result<Created, ProofError> {
        let id = NodeId::parse(id)?;
        let owner = AgentId::new(owner)?;
        let node = spec.resolve()?;
        let config = self.config;
        self.commit("create", |state, now| {
            let admitted = check_creation(state, &config, &id, &owner, node, now)?;
            Ok((
                vec![admitted.event],
                Created {
                    id,
                    warning: admitted.warning,
                },
            ))
        })
    }

    /// Create the next numbered child of `parent`.
    pub fn refine_node(
        &mut self,
        parent: &str,
        owner: &str,
        spec: &NodeSpec,
    ) -> Result<Created, ProofError> {
        let parent = NodeId::parse(parent)?;
        let owner = AgentId::new(owner)?;
        let node = spec.resolve()?;
        let config = self.config;
        self.commit("refine", |state, now| {
            let id = require_pending(state, &parent)?.next_child_id();
            let admitted = check_creation(state, &config, &id, &owner, node, now)?;
            Ok((
                vec![admitted.event],
                Created {
                    id,
                    warning: admitted.warning,
                },
            ))
        })
    }

    /// Create several consecutive children of `parent`, all or none.
    pub fn refine_node_bulk(
        &mut self,
        parent: &str,
        owner: &str,
        specs: &[NodeSpec],
    ) -> Result<Vec<Created>, ProofError> {
        let parent = NodeId::parse(parent)?;
        let owner = AgentId::new(owner)?;
        let nodes = specs
            .iter()
            .enumerate()
            .map(|(index, spec)| spec.resolve().map_err(|err| err.in_batch(index)))
            .collect::<Result<Vec<_>, _>>()?;
        let config = self.config;
        self.commit("refine_bulk", |state, now| {
            let plan = plan_refinement(state, &config, &parent, &owner, nodes, now)?;
            Ok((plan.events, plan.items))
        })
    }

    // ------------------------------------------------------------------------
    // Acceptance and refutation
    // ------------------------------------------------------------------------

    pub fn accept_node(&mut self, id: &str) -> Result<Acceptance, ProofError> {
        self.accept_node_with(id, &AcceptOptions::default())
    }

    pub fn accept_node_with_note(&mut self, id: &str, note: &str) -> Result<Acceptance, ProofError> {
        self.accept_node_with(id, &AcceptOptions::default().note(note))
    }

    pub fn accept_node_with(
        &mut self,
        id: &str,
        options: &AcceptOptions,
    ) -> Result<Acceptance, ProofError> {
        let id = NodeId::parse(id)?;
        let policy = options.resolve()?;
        self.commit("accept", |state, _now| {
            let (event, acceptance) = check_acceptance(state, &id, &policy)?;
            Ok((vec![event], acceptance))
        })
    }

    /// Accept several nodes, all or none, in the order given.
    pub fn accept_node_bulk(&mut self, ids: &[&str]) -> Result<Vec<Acceptance>, ProofError> {
        self.accept_node_bulk_with(ids, &AcceptOptions::default())
    }

    pub fn accept_node_bulk_with(
        &mut self,
        ids: &[&str],
        options: &AcceptOptions,
    ) -> Result<Vec<Acceptance>, ProofError> {
        let ids = ids
            .iter()
            .enumerate()
            .map(|(index, id)| NodeId::parse(id).map_err(|err| ProofError::from(err).in_batch(index)))
            .collect::<Result<Vec<_>, _>>()?;
        let policy = options.resolve()?;
        self.commit("accept_bulk", |state, _now| {
            let plan = plan_acceptance(state, &ids, &policy)?;
            Ok((plan.events, plan.items))
        })
    }

    pub fn refute_node(&mut self, id: &str) -> Result<(), ProofError> {
        self.refute_node_with(id, None, None)
    }

    /// Refute `id`, recording an optional reason and refuting agent.
    pub fn refute_node_with(
        &mut self,
        id: &str,
        reason: Option<&str>,
        agent: Option<&str>,
    ) -> Result<(), ProofError> {
        let id = NodeId::parse(id)?;
        let agent = agent.map(AgentId::new).transpose()?;
        let reason = reason.map(str::to_owned);
        self.commit("refute", |state, _now| {
            Ok((vec![check_refutation(state, &id, reason, agent)?], ()))
        })
    }

    // ------------------------------------------------------------------------
    // Challenges and definitions
    // ------------------------------------------------------------------------

    pub fn raise_challenge(&mut self, spec: &ChallengeSpec) -> Result<ChallengeId, ProofError> {
        let challenge = spec.resolve()?;
        let id = challenge.id.clone();
        self.commit("raise_challenge", |state, _now| {
            Ok((vec![check_challenge(state, challenge)?], id))
        })
    }

    pub fn resolve_challenge(
        &mut self,
        id: &str,
        resolution: Option<&str>,
    ) -> Result<(), ProofError> {
        let id = ChallengeId::new(id)?;
        let resolution = resolution.map(str::to_owned);
        self.commit("resolve_challenge", |state, _now| {
            Ok((vec![check_resolution(state, &id, resolution)?], ()))
        })
    }

    pub fn add_definition(&mut self, name: &str, description: &str) -> Result<(), ProofError> {
        let name = DefinitionName::new(name)?;
        let description = non_empty(description, "definition description")?;
        self.commit("add_definition", |state, _now| {
            Ok((vec![check_definition(state, name, description)?], ()))
        })
    }

    /// Read-validate-append under the ledger's write lock.
    fn commit<T>(
        &mut self,
        operation: &'static str,
        plan: impl FnOnce(&State, DateTime<Utc>) -> Result<(Vec<Event>, T), ProofError>,
    ) -> Result<T, ProofError> {
        let clock = &self.clock;
        let cache = &self.cache;
        let committed = self.ledger.transact(
            || clock.now(),
            |reader| {
                let state = cache.load(reader)?;
                plan(&state, reader.recorded_at())
            },
        )?;
        debug!(operation, seqs = ?committed.seqs, "Operation committed");
        Ok(committed.value)
    }
}

fn ledger_options(config: &ProofConfig) -> LedgerOptions {
    LedgerOptions {
        busy_timeout: config.busy_timeout(),
    }
}

/// Best-effort removal of a ledger left behind by a failed initialization.
fn remove_ledger_files(ledger_path: &Path) {
    for suffix in ["", "-wal", "-shm"] {
        let mut path = ledger_path.as_os_str().to_owned();
        path.push(suffix);
        if let Err(e) = fs::remove_file(&path)
            && e.kind() != IoErrorKind::NotFound
        {
            warn!(
                path = %Path::new(&path).display(),
                error = %e,
                "Failed to remove partial ledger file"
            );
        }
    }
}

fn non_empty(value: &str, field: &'static str) -> Result<NonEmptyString, ProofError> {
    NonEmptyString::new(value).map_err(|_| ProofError::EmptyText { field })
}
