use crate::core::{Ancestry, Anomaly, CommitGraph, CommitId, CommitRecord};
use crate::error::{GraphError, Result};
use crate::git_backend::{
    CancelToken, Enumerator, GitSource, PlumbingCommand, SortOrder, TraversalOptions,
    TraversalRequest,
};
use crate::layout::{GraphRow, Lane, LaneAssigner};
use smallvec::SmallVec;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// What a reload runs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraversalPlan {
    command: PlumbingCommand,
    sort: SortOrder,
}

impl TraversalPlan {
    pub fn git(source: &GitSource, request: &TraversalRequest) -> Self {
        Self {
            command: request.command(source),
            sort: request.sort,
        }
    }

    /// Any producer of records in the log format
    pub fn from_command(command: PlumbingCommand, sort: SortOrder) -> Self {
        Self { command, sort }
    }

    pub fn command(&self) -> &PlumbingCommand {
        &self.command
    }

    pub fn sort(&self) -> SortOrder {
        self.sort
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadState {
    /// Nothing loaded yet
    Idle,
    /// More rows can be pulled
    Active,
    /// The whole history is materialized
    Complete,
    /// The traversal failed or was cancelled; rows so far stay visible
    Interrupted,
}

/// Everything one traversal produced. Replaced as a whole on reload.
struct Session {
    enumerator: Option<Enumerator>,
    sort: SortOrder,
    graph: CommitGraph,
    lanes: LaneAssigner,
    rows: Vec<GraphRow>,
    index: HashMap<CommitId, usize>,
    state: LoadState,
}

impl Session {
    fn idle(sort: SortOrder) -> Self {
        Self {
            enumerator: None,
            sort,
            graph: CommitGraph::new(),
            lanes: LaneAssigner::new(),
            rows: Vec::new(),
            index: HashMap::new(),
            state: LoadState::Idle,
        }
    }

    fn start(plan: &TraversalPlan, options: &TraversalOptions) -> Result<Self> {
        let enumerator = Enumerator::from_command(&plan.command, plan.sort, options)?;
        Ok(Self {
            enumerator: Some(enumerator),
            state: LoadState::Active,
            ..Self::idle(plan.sort)
        })
    }

    fn extend(&mut self, n: usize) -> Result<usize> {
        match self.state {
            LoadState::Active => {}
            LoadState::Complete => return Ok(0),
            LoadState::Idle | LoadState::Interrupted => return Err(GraphError::ReloadRequired),
        }
        let Some(enumerator) = self.enumerator.as_mut() else {
            return Err(GraphError::ReloadRequired);
        };

        // Nothing reaches graph or lanes until the whole batch was read
        let mut staged = Vec::with_capacity(n.min(1024));
        let mut exhausted = false;
        let mut failure = None;
        while staged.len() < n {
            match enumerator.next() {
                Some(Ok(record)) => staged.push(record),
                Some(Err(err)) => {
                    failure = Some(err);
                    break;
                }
                None => {
                    exhausted = true;
                    break;
                }
            }
        }

        if let Some(err) = failure {
            warn!(discarded = staged.len(), error = %err, "history traversal interrupted");
            self.interrupt();
            return Err(err);
        }

        let added = staged.len();
        for record in staged {
            self.push(record);
        }
        debug!(added, total = self.rows.len(), "materialized history rows");

        if exhausted {
            self.enumerator = None;
            self.state = LoadState::Complete;
            info!(
                rows = self.rows.len(),
                open_lanes = self.lanes.open_lanes().len(),
                "history fully loaded"
            );
        }
        Ok(added)
    }

    fn push(&mut self, record: CommitRecord) {
        let record = Arc::new(record);
        let outcome = self.graph.insert(Arc::clone(&record));
        if outcome.is_duplicate() {
            warn!(commit = %record.id, "commit listed twice, ignoring");
            return;
        }
        for anomaly in &outcome.anomalies {
            if let Anomaly::ParentAlreadyMaterialized { child, parent } = anomaly {
                // expected with clock skew under time order
                match self.sort {
                    SortOrder::Topo => warn!(%child, %parent, "parent listed before its child"),
                    SortOrder::Time => debug!(%child, %parent, "parent listed before its child"),
                }
            }
        }

        let dangling: SmallVec<[CommitId; 1]> = outcome.dangling_parents().cloned().collect();
        let row = self.lanes.assign(&record, &dangling);
        self.index.insert(record.id.clone(), self.rows.len());
        self.rows.push(row);
    }

    fn interrupt(&mut self) {
        if let Some(enumerator) = self.enumerator.take() {
            enumerator.cancel();
        }
        if self.state == LoadState::Active {
            self.state = LoadState::Interrupted;
        }
    }
}

/// Rows of one history listing, loaded on demand.
///
/// Owns the traversal together with the graph and lane state built from it.
/// All of it lives on the thread that owns the list; records arrive from
/// the reader thread over a bounded channel.
///
/// A failed or cancelled traversal discards the page it was loading, but
/// rows from earlier pages of the same traversal stay visible. The list is
/// then [`LoadState::Interrupted`]: the rows are an incomplete history, and
/// `extend` fails with [`GraphError::ReloadRequired`] until `reload`.
pub struct HistoryList {
    plan: TraversalPlan,
    options: TraversalOptions,
    session: Session,
    head: Option<CommitId>,
}

impl HistoryList {
    pub fn new(plan: TraversalPlan, options: TraversalOptions) -> Self {
        let session = Session::idle(plan.sort);
        Self {
            plan,
            options,
            session,
            head: None,
        }
    }

    pub fn plan(&self) -> &TraversalPlan {
        &self.plan
    }

    pub fn options(&self) -> &TraversalOptions {
        &self.options
    }

    /// Takes effect on the next `reload`
    pub fn set_plan(&mut self, plan: TraversalPlan) {
        self.plan = plan;
    }

    /// Drop everything and list the history again, loading the first page.
    ///
    /// The current rows are only replaced once the new traversal delivered
    /// its first page; on error they stay as they were.
    pub fn reload(&mut self) -> Result<usize> {
        self.session.interrupt();

        let mut fresh = Session::start(&self.plan, &self.options)?;
        let loaded = fresh.extend(self.options.page_size)?;
        self.session = fresh;
        info!(rows = loaded, sort = ?self.plan.sort, "history reloaded");
        Ok(loaded)
    }

    /// Load up to `n` more rows; returns how many were added
    pub fn extend(&mut self, n: usize) -> Result<usize> {
        self.session.extend(n)
    }

    /// Keep extending until the history is exhausted
    pub fn load_all(&mut self) -> Result<usize> {
        let mut total = 0;
        loop {
            let added = self.extend(self.options.page_size.max(1))?;
            if added == 0 {
                return Ok(total);
            }
            total += added;
        }
    }

    /// Stop the running traversal; the loaded rows stay
    pub fn cancel(&mut self) {
        self.session.interrupt();
    }

    /// Token for cancelling from another thread
    pub fn cancel_handle(&self) -> Option<CancelToken> {
        self.session.enumerator.as_ref().map(Enumerator::cancel_token)
    }

    pub fn state(&self) -> LoadState {
        self.session.state
    }

    pub fn is_complete(&self) -> bool {
        self.session.state == LoadState::Complete
    }

    pub fn rows(&self) -> &[GraphRow] {
        &self.session.rows
    }

    pub fn row(&self, index: usize) -> Option<&GraphRow> {
        self.session.rows.get(index)
    }

    pub fn len(&self) -> usize {
        self.session.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.session.rows.is_empty()
    }

    /// Row index of a commit. A commit that is not loaded yet is reported,
    /// the caller decides whether to extend.
    pub fn select(&self, id: &CommitId) -> Result<usize> {
        self.session
            .index
            .get(id)
            .copied()
            .ok_or_else(|| GraphError::NotMaterialized(id.clone()))
    }

    pub fn graph(&self) -> &CommitGraph {
        &self.session.graph
    }

    /// Lanes waiting for commits that are not loaded
    pub fn open_lanes(&self) -> Vec<Lane> {
        self.session.lanes.open_lanes()
    }

    pub fn max_width(&self) -> usize {
        self.session.lanes.max_width()
    }

    pub fn set_head(&mut self, head: Option<CommitId>) {
        self.head = head;
    }

    pub fn head(&self) -> Option<&CommitId> {
        self.head.as_ref()
    }

    /// Whether the commit is part of the checked out history
    pub fn is_on_head_line(&self, id: &CommitId) -> bool {
        self.head
            .as_ref()
            .is_some_and(|head| self.session.graph.is_ancestor(id, head))
    }

    pub fn is_ancestor(&self, ancestor: &CommitId, descendant: &CommitId) -> bool {
        self.session.graph.is_ancestor(ancestor, descendant)
    }

    pub fn ancestry(&self, ancestor: &CommitId, descendant: &CommitId) -> Ancestry {
        self.session.graph.ancestry(ancestor, descendant)
    }

    pub fn same_branch(&self, a: &CommitId, b: &CommitId) -> bool {
        self.session.graph.same_branch(a, b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::id::test_id;
    use crate::core::record::fixtures::record;
    use crate::git_backend::fixtures::{cat, commit_at, fixture, git_available, id_of, sh, stream};
    use crate::git_backend::RefSpec;
    use crate::layout::LaneIdx;
    use git2::Repository;
    use pretty_assertions::assert_eq;
    use tempfile::{NamedTempFile, TempDir};

    fn options(page_size: usize) -> TraversalOptions {
        TraversalOptions {
            page_size,
            ..Default::default()
        }
    }

    fn list(file: &NamedTempFile, sort: SortOrder, page_size: usize) -> HistoryList {
        HistoryList::new(TraversalPlan::from_command(cat(file), sort), options(page_size))
    }

    fn ids(list: &HistoryList) -> Vec<CommitId> {
        list.rows().iter().map(|r| r.id().clone()).collect()
    }

    fn lanes(list: &HistoryList) -> Vec<LaneIdx> {
        list.rows().iter().map(|r| r.lane).collect()
    }

    /// 4 merges 2 and 3, which both continue to 1
    fn merge_history() -> Vec<CommitRecord> {
        vec![
            record(4, &[2, 3], 40),
            record(2, &[1], 30),
            record(3, &[1], 20),
            record(1, &[], 10),
        ]
    }

    #[test]
    fn loads_a_page_then_extends_on_demand() {
        let file = fixture(&stream(&merge_history()));
        let mut list = list(&file, SortOrder::Topo, 2);
        assert_eq!(list.state(), LoadState::Idle);

        assert_eq!(list.reload().unwrap(), 2);
        assert_eq!(list.len(), 2);
        assert!(!list.is_complete());

        assert_eq!(list.extend(10).unwrap(), 2);
        assert!(list.is_complete());
        assert_eq!(list.extend(10).unwrap(), 0);
        assert!(list.cancel_handle().is_none());
    }

    #[test]
    fn linear_history_rows() {
        let file = fixture(&stream(&[
            record(3, &[2], 30),
            record(2, &[1], 20),
            record(1, &[], 10),
        ]));
        let mut list = list(&file, SortOrder::Topo, 10);
        list.reload().unwrap();
        assert_eq!(ids(&list), vec![test_id(3), test_id(2), test_id(1)]);
        assert_eq!(lanes(&list), vec![0, 0, 0]);
        assert!(list.open_lanes().is_empty());
    }

    #[test]
    fn merge_history_rows() {
        let file = fixture(&stream(&merge_history()));
        let mut list = list(&file, SortOrder::Topo, 10);
        list.reload().unwrap();

        assert_eq!(lanes(&list), vec![0, 0, 1, 0]);
        let merge = list.row(0).unwrap();
        assert_eq!(
            merge.outgoing.iter().map(|e| e.lane).collect::<Vec<_>>(),
            vec![0, 1]
        );
        let root = list.row(3).unwrap();
        assert_eq!(root.closed.iter().map(|c| c.lane).collect::<Vec<_>>(), vec![1]);
        assert!(list.graph().verify_topological(&ids(&list)).is_ok());
    }

    #[test]
    fn extend_needs_a_reload_first() {
        let file = fixture(&stream(&merge_history()));
        let mut list = list(&file, SortOrder::Topo, 2);
        assert!(matches!(list.extend(1), Err(GraphError::ReloadRequired)));
    }

    #[test]
    fn failed_reload_keeps_previous_rows() {
        let file = fixture(&stream(&merge_history()));
        let mut list = list(&file, SortOrder::Topo, 10);
        list.reload().unwrap();

        let broken = sh("echo 'fatal: not a git repository' >&2; exit 128", &file);
        list.set_plan(TraversalPlan::from_command(broken, SortOrder::Topo));
        match list.reload() {
            Err(GraphError::ProcessExit { code, stderr }) => {
                assert_eq!(code, Some(128));
                assert_eq!(stderr, "fatal: not a git repository");
            }
            other => panic!("expected process failure, got {:?}", other),
        }
        assert_eq!(list.len(), 4);
        assert!(list.is_complete());
    }

    #[test]
    fn failure_mid_traversal_discards_the_batch() {
        let file = fixture(&stream(&merge_history()));
        let failing = sh("cat \"$1\"; exit 1", &file);
        let mut list = HistoryList::new(
            TraversalPlan::from_command(failing, SortOrder::Topo),
            options(1),
        );
        assert_eq!(list.reload().unwrap(), 1);

        assert!(matches!(list.extend(10), Err(GraphError::ProcessExit { .. })));
        assert_eq!(list.len(), 1);
        assert_eq!(list.graph().len(), 1);
        assert_eq!(list.state(), LoadState::Interrupted);
        assert!(matches!(list.extend(10), Err(GraphError::ReloadRequired)));
    }

    #[test]
    fn cancelling_keeps_loaded_rows() {
        let file = fixture(&stream(&merge_history()));
        let blocking = sh("cat \"$1\"; exec sleep 30", &file);
        let mut list = HistoryList::new(
            TraversalPlan::from_command(blocking, SortOrder::Topo),
            options(1),
        );
        list.reload().unwrap();

        let handle = list.cancel_handle().unwrap();
        std::thread::spawn(move || handle.cancel()).join().unwrap();

        assert!(matches!(list.extend(10), Err(GraphError::Cancelled)));
        assert_eq!(list.len(), 1);
        assert!(matches!(list.extend(10), Err(GraphError::ReloadRequired)));
    }

    #[test]
    fn select_reports_commits_not_loaded() {
        let file = fixture(&stream(&merge_history()));
        let mut list = list(&file, SortOrder::Topo, 2);
        list.reload().unwrap();

        assert_eq!(list.select(&test_id(2)).unwrap(), 1);
        match list.select(&test_id(1)) {
            Err(GraphError::NotMaterialized(id)) => assert_eq!(id, test_id(1)),
            other => panic!("expected a miss, got {:?}", other),
        }

        list.load_all().unwrap();
        assert_eq!(list.select(&test_id(1)).unwrap(), 3);
    }

    #[test]
    fn head_line_decoration() {
        let mut bytes = stream(&merge_history());
        bytes.extend(stream(&[record(9, &[], 5)]));
        let file = fixture(&bytes);
        let mut list = list(&file, SortOrder::Topo, 10);
        list.reload().unwrap();

        assert!(!list.is_on_head_line(&test_id(1)));
        list.set_head(Some(test_id(2)));
        assert!(list.is_on_head_line(&test_id(1)));
        assert!(list.is_on_head_line(&test_id(2)));
        assert!(!list.is_on_head_line(&test_id(3)));
        assert!(!list.is_on_head_line(&test_id(9)));

        assert!(list.same_branch(&test_id(2), &test_id(3)));
        assert!(!list.same_branch(&test_id(3), &test_id(9)));
    }

    #[test]
    fn time_order_with_clock_skew_leaves_no_lane_open() {
        // the child is older than its parent
        let file = fixture(&stream(&[record(2, &[1], 10), record(1, &[], 20)]));
        let mut list = list(&file, SortOrder::Time, 10);
        list.reload().unwrap();

        assert_eq!(ids(&list), vec![test_id(1), test_id(2)]);
        let child = list.row(1).unwrap();
        assert!(child.outgoing.is_empty());
        assert_eq!(child.dangling.to_vec(), vec![test_id(1)]);
        assert!(list.open_lanes().is_empty());
        assert_eq!(list.graph().children(&test_id(1)), &[test_id(2)]);
    }

    #[test]
    fn unknown_ancestry_beyond_the_loaded_rows() {
        let file = fixture(&stream(&merge_history()));
        let mut list = list(&file, SortOrder::Topo, 2);
        list.reload().unwrap();
        // 3 is listed as a parent of 4 but not loaded yet
        assert_eq!(list.ancestry(&test_id(7), &test_id(4)), Ancestry::Unknown);
        assert_eq!(list.ancestry(&test_id(1), &test_id(4)), Ancestry::Yes);
        list.load_all().unwrap();
        assert_eq!(list.ancestry(&test_id(7), &test_id(4)), Ancestry::No);
    }

    fn git_list(dir: &TempDir, roots: Vec<RefSpec>) -> HistoryList {
        let request = TraversalRequest::new(roots, SortOrder::Topo);
        let plan = TraversalPlan::git(&GitSource::new("git", dir.path()), &request);
        HistoryList::new(plan, options(100))
    }

    #[test]
    fn git_linear_history() {
        if !git_available() {
            return;
        }
        let dir = TempDir::new().unwrap();
        let repo = Repository::init(dir.path()).unwrap();
        let c = commit_at(&repo, "C", &[], 1_700_000_000).unwrap();
        let b = commit_at(&repo, "B", &[c], 1_700_000_100).unwrap();
        let a = commit_at(&repo, "A\n\nbody line\n", &[b], 1_700_000_200).unwrap();

        let mut list = git_list(&dir, vec![RefSpec::Literal(id_of(a))]);
        list.reload().unwrap();

        assert_eq!(ids(&list), vec![id_of(a), id_of(b), id_of(c)]);
        assert_eq!(lanes(&list), vec![0, 0, 0]);
        assert!(list.is_complete());
        let top = &list.row(0).unwrap().record;
        assert_eq!(top.subject, "A");
        assert_eq!(top.author, "Test User");
        assert_eq!(top.timestamp.timestamp(), 1_700_000_200);
    }

    #[test]
    fn git_merge_history() {
        if !git_available() {
            return;
        }
        let dir = TempDir::new().unwrap();
        let repo = Repository::init(dir.path()).unwrap();
        let r = commit_at(&repo, "R", &[], 1_700_000_000).unwrap();
        let p1 = commit_at(&repo, "P1", &[r], 1_700_000_100).unwrap();
        let p2 = commit_at(&repo, "P2", &[r], 1_700_000_200).unwrap();
        let m = commit_at(&repo, "M", &[p1, p2], 1_700_000_300).unwrap();
        repo.reference("refs/heads/main", m, true, "test").unwrap();

        let mut list = git_list(&dir, RefSpec::local_branches());
        list.reload().unwrap();

        let order = ids(&list);
        assert_eq!(order.len(), 4);
        assert_eq!(order[0], id_of(m));
        assert_eq!(order[3], id_of(r));
        assert!(list.graph().verify_topological(&order).is_ok());

        let merge = list.row(0).unwrap();
        assert_eq!(merge.lane, 0);
        assert_eq!(
            merge.outgoing.iter().map(|e| (e.lane, e.parent.clone())).collect::<Vec<_>>(),
            vec![(0, id_of(p1)), (1, id_of(p2))]
        );
        assert_eq!(list.row(list.select(&id_of(p1)).unwrap()).unwrap().lane, 0);
        assert_eq!(list.row(list.select(&id_of(p2)).unwrap()).unwrap().lane, 1);
        let root = list.row(3).unwrap();
        assert_eq!(root.lane, 0);
        assert_eq!(root.closed.len(), 1);
        assert!(list.open_lanes().is_empty());
    }

    #[test]
    fn git_bad_revision_is_a_process_error() {
        if !git_available() {
            return;
        }
        let dir = TempDir::new().unwrap();
        Repository::init(dir.path()).unwrap();
        let mut list = git_list(&dir, vec![RefSpec::Literal(test_id(1))]);
        assert!(matches!(list.reload(), Err(GraphError::ProcessExit { .. })));
        assert!(list.is_empty());
    }
}
