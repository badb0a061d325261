//! The precedence DAG: vertices, labeled edges, topological group-id
//! assignment, and global ordering points (GOPs).
//!
//! The DAG owns every vertex and edge it creates; callers only ever see
//! [`VertexId`]/[`EdgeId`] handles into it. Phase ordering itself is wired
//! as a chain of built-in GOPs at construction time, so the sort algorithm
//! never needs to special-case phases.

use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use tickgraph_common::{CycleTrace, EdgeId, GroupId, KernelError, Phase, VertexId};

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum Marker {
    White,
    Gray,
    Black,
}

struct Vertex {
    label: String,
    is_gop: bool,
    marker: Marker,
    group_id: GroupId,
    working_inbound: u32,
    inbound_count: u32,
    out_edges: SmallVec<[(VertexId, EdgeId); 4]>,
    /// For GOPs: associate vertices whose group-id is copied from this one
    /// at `finalize()`.
    associates: SmallVec<[VertexId; 4]>,
    /// For non-GOP vertices: whether a group-id has already been assigned
    /// by some controller other than `sort()` (i.e. via GOP transfer).
    group_id_source: Option<GroupIdSource>,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum GroupIdSource {
    Gop(VertexId),
}

struct Edge {
    source: VertexId,
    dest: VertexId,
    label: String,
}

/// The seven scheduling phases wired as a chain of built-in GOPs, in the
/// order phase ordering requires.
pub struct PhaseGops {
    pub vertices: [VertexId; Phase::COUNT],
}

impl PhaseGops {
    pub fn vertex_for(&self, phase: Phase) -> VertexId {
        self.vertices[phase.as_index()]
    }
}

/// Owns every vertex and edge in the precedence graph.
pub struct Dag {
    vertices: Vec<Vertex>,
    edges: Vec<Edge>,
    gop_index: FxHashMap<String, VertexId>,
    finalized: bool,
    early_cycle_detect: bool,
    phase_gops: Option<PhaseGops>,
}

impl Dag {
    /// Create a DAG with the seven phase GOPs already wired
    /// (`Trigger -> Update -> PortUpdate -> Flush -> Collection -> Tick ->
    /// PostTick`).
    pub fn new(early_cycle_detect: bool) -> Result<Self, KernelError> {
        let mut dag = Self {
            vertices: Vec::new(),
            edges: Vec::new(),
            gop_index: FxHashMap::default(),
            finalized: false,
            early_cycle_detect,
            phase_gops: None,
        };

        let mut phase_vertices = [VertexId::new(0); Phase::COUNT];
        for phase in Phase::ALL {
            phase_vertices[phase.as_index()] = dag.find_or_create_gop(phase.to_string().as_str());
        }
        for pair in phase_vertices.windows(2) {
            dag.link(pair[0], pair[1], "phase-order")?;
        }
        dag.phase_gops = Some(PhaseGops {
            vertices: phase_vertices,
        });
        Ok(dag)
    }

    /// A DAG with no phase wiring at all. Only the scheduler should ever
    /// skip the phase chain; this exists so sort/GOP unit tests can reason
    /// about a vertex set they fully control instead of one sharing a
    /// disconnected seven-vertex component with `Dag::new`.
    #[cfg(test)]
    fn bare(early_cycle_detect: bool) -> Result<Self, KernelError> {
        Ok(Self {
            vertices: Vec::new(),
            edges: Vec::new(),
            gop_index: FxHashMap::default(),
            finalized: false,
            early_cycle_detect,
            phase_gops: None,
        })
    }

    /// The vertex backing each of the seven built-in phase GOPs.
    pub fn phase_gops(&self) -> &PhaseGops {
        self.phase_gops
            .as_ref()
            .expect("phase GOPs are wired during Dag::new")
    }

    /// Create a new, unconnected vertex.
    pub fn new_vertex(&mut self, label: impl Into<String>) -> VertexId {
        self.push_vertex(label.into(), false)
    }

    fn push_vertex(&mut self, label: String, is_gop: bool) -> VertexId {
        let id = VertexId::new(self.vertices.len() as u32);
        self.vertices.push(Vertex {
            label,
            is_gop,
            marker: Marker::White,
            group_id: GroupId::UNSORTED,
            working_inbound: 0,
            inbound_count: 0,
            out_edges: SmallVec::new(),
            associates: SmallVec::new(),
            group_id_source: None,
        });
        id
    }

    /// Look up a named global ordering point, creating it on first use.
    pub fn find_or_create_gop(&mut self, name: &str) -> VertexId {
        if let Some(&id) = self.gop_index.get(name) {
            return id;
        }
        let id = self.push_vertex(name.to_string(), true);
        self.gop_index.insert(name.to_string(), id);
        id
    }

    /// Register `vertex` as an associate of GOP `gop`. Its group-id is
    /// copied from the GOP at `finalize()`.
    pub fn add_gop_associate(&mut self, gop: VertexId, vertex: VertexId) {
        self.vertices[gop.as_index()].associates.push(vertex);
    }

    /// Add the ordering constraint `src -> dst`. Idempotent: linking the
    /// same pair twice adds no second edge. Runs early cycle detection
    /// when configured to, returning `KernelError::Cycle` immediately if
    /// the new edge closes a cycle.
    pub fn link(
        &mut self,
        src: VertexId,
        dst: VertexId,
        label: impl Into<String>,
    ) -> Result<EdgeId, KernelError> {
        if src == dst {
            return Err(KernelError::config(format!(
                "cannot link vertex {src} to itself"
            )));
        }
        if let Some(existing) = self.find_edge(src, dst) {
            return Ok(existing);
        }

        let edge_id = EdgeId::new(self.edges.len() as u32);
        self.edges.push(Edge {
            source: src,
            dest: dst,
            label: label.into(),
        });
        self.vertices[src.as_index()]
            .out_edges
            .push((dst, edge_id));
        self.vertices[dst.as_index()].inbound_count += 1;

        if self.early_cycle_detect {
            if let Some(trace) = self.detect_cycle() {
                return Err(KernelError::Cycle(trace));
            }
        }
        Ok(edge_id)
    }

    /// Remove the edge `src -> dst` if present.
    pub fn unlink(&mut self, src: VertexId, dst: VertexId) {
        let Some(edge_id) = self.find_edge(src, dst) else {
            return;
        };
        self.vertices[src.as_index()]
            .out_edges
            .retain(|&(d, e)| !(d == dst && e == edge_id));
        self.vertices[dst.as_index()].inbound_count -= 1;
    }

    fn find_edge(&self, src: VertexId, dst: VertexId) -> Option<EdgeId> {
        self.vertices[src.as_index()]
            .out_edges
            .iter()
            .find(|&&(d, _)| d == dst)
            .map(|&(_, e)| e)
    }

    /// Vertex display label, for diagnostics.
    pub fn label(&self, id: VertexId) -> &str {
        &self.vertices[id.as_index()].label
    }

    /// The vertex's group-id. Meaningful only after `sort()`/`finalize()`.
    pub fn group_id(&self, id: VertexId) -> GroupId {
        self.vertices[id.as_index()].group_id
    }

    /// Kahn-style layered topological sort. Assigns every vertex the
    /// smallest group-id such that every edge goes from a strictly smaller
    /// group-id to a larger one. Returns the number of distinct group-ids
    /// in use.
    pub fn sort(&mut self) -> Result<u32, KernelError> {
        let mut work_list: Vec<VertexId> = Vec::new();

        for (idx, vertex) in self.vertices.iter_mut().enumerate() {
            vertex.group_id = GroupId::UNSORTED;
            vertex.working_inbound = vertex.inbound_count;
            if vertex.working_inbound == 0 {
                work_list.push(VertexId::new(idx as u32));
            }
        }

        let mut remaining = self.vertices.len();
        let mut cursor = 0usize;
        while cursor < work_list.len() {
            let v = work_list[cursor];
            cursor += 1;
            remaining -= 1;

            let gid = self.vertices[v.as_index()].group_id;
            let out_edges = self.vertices[v.as_index()].out_edges.clone();
            for (w, _) in out_edges {
                let w_vertex = &mut self.vertices[w.as_index()];
                debug_assert!(w_vertex.working_inbound > 0);
                w_vertex.working_inbound -= 1;
                if w_vertex.group_id <= gid {
                    w_vertex.group_id = gid.next();
                }
                if w_vertex.working_inbound == 0 {
                    work_list.push(w);
                }
            }
        }

        if remaining != 0 {
            let trace = self
                .detect_cycle()
                .unwrap_or_else(|| CycleTrace::new(Vec::new(), Vec::new()));
            return Err(KernelError::Cycle(trace));
        }

        // Every vertex's group-id has been assigned by now; the count in
        // use is just the highest one reached, since ids are dense from 1.
        let num_groups = self
            .vertices
            .iter()
            .map(|v| v.group_id.0)
            .max()
            .unwrap_or(0);

        Ok(num_groups)
    }

    /// `sort()`, then transfer each GOP's group-id to its associates, then
    /// freeze the DAG against further structural edits.
    pub fn finalize(&mut self) -> Result<u32, KernelError> {
        let n_groups = self.sort()?;
        self.finalize_gops()?;
        self.finalized = true;
        Ok(n_groups)
    }

    fn finalize_gops(&mut self) -> Result<(), KernelError> {
        let gop_ids: Vec<VertexId> = self.gop_index.values().copied().collect();
        for gop in gop_ids {
            let gid = self.vertices[gop.as_index()].group_id;
            let associates = self.vertices[gop.as_index()].associates.clone();
            for assoc in associates {
                let target = &mut self.vertices[assoc.as_index()];
                if let Some(GroupIdSource::Gop(other)) = target.group_id_source {
                    if other != gop {
                        return Err(KernelError::OrderingConflict { vertex: assoc });
                    }
                }
                target.group_id = gid;
                target.group_id_source = Some(GroupIdSource::Gop(gop));
            }
        }
        Ok(())
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    /// DFS cycle search with WHITE/GRAY/BLACK markers. Returns the first
    /// cycle found, rendered as a [`CycleTrace`].
    pub fn detect_cycle(&mut self) -> Option<CycleTrace> {
        for v in &mut self.vertices {
            v.marker = Marker::White;
        }

        let ids: Vec<VertexId> = (0..self.vertices.len() as u32).map(VertexId::new).collect();
        for id in ids {
            if self.vertices[id.as_index()].marker == Marker::White {
                let mut path = Vec::new();
                if let Some(cycle) = self.dfs_find_cycle(id, &mut path) {
                    return Some(cycle);
                }
            }
        }
        None
    }

    fn dfs_find_cycle(&mut self, v: VertexId, path: &mut Vec<VertexId>) -> Option<CycleTrace> {
        self.vertices[v.as_index()].marker = Marker::Gray;
        path.push(v);

        let out = self.vertices[v.as_index()].out_edges.clone();
        for (w, _) in out {
            match self.vertices[w.as_index()].marker {
                Marker::White => {
                    if let Some(c) = self.dfs_find_cycle(w, path) {
                        return Some(c);
                    }
                }
                Marker::Gray => {
                    let start = path.iter().position(|&p| p == w).unwrap_or(0);
                    let cycle_vertices: Vec<VertexId> = path[start..].to_vec();
                    let labels = cycle_vertices
                        .iter()
                        .map(|&id| self.vertices[id.as_index()].label.clone())
                        .collect();
                    return Some(CycleTrace::new(cycle_vertices, labels));
                }
                Marker::Black => {}
            }
        }

        path.pop();
        self.vertices[v.as_index()].marker = Marker::Black;
        None
    }

    pub fn num_vertices(&self) -> usize {
        self.vertices.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_test_dag() -> Dag {
        // early_cycle_detect off so tests can build structures incrementally
        // without premature cycle checks; bare so num_groups reflects only
        // the vertices the test itself creates.
        Dag::bare(false).unwrap()
    }

    #[test]
    fn s1_linear_chain() {
        let mut dag = new_test_dag();
        let a = dag.new_vertex("a");
        let b = dag.new_vertex("b");
        let c = dag.new_vertex("c");
        let d = dag.new_vertex("d");
        let e = dag.new_vertex("e");
        dag.link(a, b, "").unwrap();
        dag.link(b, c, "").unwrap();
        dag.link(c, d, "").unwrap();
        dag.link(d, e, "").unwrap();

        let n = dag.sort().unwrap();
        assert_eq!(dag.group_id(a).0, 1);
        assert_eq!(dag.group_id(b).0, 2);
        assert_eq!(dag.group_id(c).0, 3);
        assert_eq!(dag.group_id(d).0, 4);
        assert_eq!(dag.group_id(e).0, 5);
        assert_eq!(n, 5);
    }

    #[test]
    fn s2_diamond() {
        let mut dag = new_test_dag();
        let a = dag.new_vertex("a");
        let b = dag.new_vertex("b");
        let c = dag.new_vertex("c");
        let d = dag.new_vertex("d");
        dag.link(a, b, "").unwrap();
        dag.link(a, c, "").unwrap();
        dag.link(b, d, "").unwrap();
        dag.link(c, d, "").unwrap();

        let n = dag.sort().unwrap();
        assert_eq!(dag.group_id(a).0, 1);
        assert_eq!(dag.group_id(b).0, 2);
        assert_eq!(dag.group_id(c).0, 2);
        assert_eq!(dag.group_id(d).0, 3);
        assert_eq!(n, 3);
    }

    #[test]
    fn s3_cycle_is_detected() {
        let mut dag = new_test_dag();
        let a = dag.new_vertex("a");
        let b = dag.new_vertex("b");
        let c = dag.new_vertex("c");
        let d = dag.new_vertex("d");
        let e = dag.new_vertex("e");
        dag.link(a, b, "").unwrap();
        dag.link(b, c, "").unwrap();
        dag.link(c, d, "").unwrap();
        dag.link(d, e, "").unwrap();
        dag.link(e, a, "").unwrap();

        let err = dag.sort().unwrap_err();
        match err {
            KernelError::Cycle(trace) => {
                let labels: Vec<&str> = trace.labels.iter().map(String::as_str).collect();
                assert!(labels.contains(&"a"));
                assert!(labels.contains(&"b"));
                assert!(labels.contains(&"c"));
                assert!(labels.contains(&"d"));
                assert!(labels.contains(&"e"));
            }
            other => panic!("expected Cycle, got {other:?}"),
        }
    }

    #[test]
    fn s4_5x5_grid() {
        let mut dag = new_test_dag();
        let mut grid = [[VertexId::new(0); 5]; 5];
        for i in 0..5 {
            for j in 0..5 {
                grid[i][j] = dag.new_vertex(format!("g{i}{j}"));
            }
        }
        for i in 0..5 {
            for j in 0..5 {
                if j + 1 < 5 {
                    dag.link(grid[i][j], grid[i][j + 1], "").unwrap();
                }
                if i + 1 < 5 {
                    dag.link(grid[i][j], grid[i + 1][j], "").unwrap();
                }
            }
        }

        let n = dag.sort().unwrap();
        for i in 0..5 {
            for j in 0..5 {
                assert_eq!(dag.group_id(grid[i][j]).0 as usize, i + j + 1);
            }
        }
        assert_eq!(n, 9);
    }

    #[test]
    fn s5_gop_rendezvous() {
        let mut dag = new_test_dag();
        let ex = dag.new_vertex("ex");
        let ey = dag.new_vertex("ey");
        let rx = dag.find_or_create_gop("rx");
        dag.link(ex, rx, "").unwrap();
        dag.link(rx, ey, "").unwrap();
        // Only the downstream side adopts the GOP's group-id; `ex` keeps
        // the id the ordinary edge-based sort gave it.
        dag.add_gop_associate(rx, ey);

        dag.finalize().unwrap();
        assert!(dag.group_id(ex) < dag.group_id(rx));
        assert_eq!(dag.group_id(rx), dag.group_id(ey));
    }

    #[test]
    fn link_is_idempotent() {
        let mut dag = new_test_dag();
        let a = dag.new_vertex("a");
        let b = dag.new_vertex("b");
        let e1 = dag.link(a, b, "first").unwrap();
        let e2 = dag.link(a, b, "second").unwrap();
        assert_eq!(e1, e2);
        assert_eq!(dag.vertices[b.as_index()].inbound_count, 1);
    }

    #[test]
    fn self_link_is_config_error() {
        let mut dag = new_test_dag();
        let a = dag.new_vertex("a");
        assert!(matches!(
            dag.link(a, a, ""),
            Err(KernelError::Config(_))
        ));
    }

    #[test]
    fn phase_chain_is_wired_on_construction() {
        let mut dag = Dag::new(false).unwrap();
        let n = dag.sort().unwrap();
        assert_eq!(n, Phase::COUNT as u32);
        let gops = dag.phase_gops();
        for w in gops.vertices.windows(2) {
            assert!(dag.group_id(w[0]) < dag.group_id(w[1]));
        }
    }
}
