/*!

  Single-entry DAG structures over basic blocks, used to synthesise host
  control flow for fuzzed patterns.

  A DAG over `n` blocks is a reverse adjacency list filled like a lower
  triangular matrix, so enumeration of every DAG is exhaustive and cheap
  for the block counts the fuzzer uses.

*/

use std::collections::BTreeSet;

#[derive(Clone, Debug, Default)]
pub struct SingleEntryDag {
    pub size: usize,
    pub reverse_adjacency: Vec<BTreeSet<usize>>,
}

impl SingleEntryDag {
    pub fn new() -> SingleEntryDag {
        SingleEntryDag::default()
    }

    fn with_first(self_loop: bool) -> SingleEntryDag {
        let first = if self_loop {
            BTreeSet::from([0])
        } else {
            BTreeSet::new()
        };
        SingleEntryDag {
            size: 1,
            reverse_adjacency: vec![first],
        }
    }

    /// Append a node given the set of its predecessors. At least one must
    /// already be in the DAG.
    pub fn add_node(&mut self, parents: BTreeSet<usize>) {
        assert!(
            parents.iter().any(|p| *p < self.size),
            "a new node needs a non-self parent"
        );
        assert!(
            parents.iter().all(|p| *p <= self.size),
            "a parent must already be in the DAG"
        );
        self.reverse_adjacency.push(parents);
        self.size += 1;
    }

    /// Forward adjacency (successor sets), derived from the reverse list.
    pub fn adjacency_list(&self) -> Vec<BTreeSet<usize>> {
        let mut adjacency = vec![BTreeSet::new(); self.size];
        for (node, parents) in self.reverse_adjacency.iter().enumerate() {
            for parent in parents {
                adjacency[*parent].insert(node);
            }
        }
        adjacency
    }

    /// For each block, the set of blocks that strictly dominate it.
    pub fn dominance_list(&self) -> Vec<BTreeSet<usize>> {
        let mut dominance: Vec<BTreeSet<usize>> = vec![BTreeSet::new()];
        for i in 1..self.size {
            let mut strict = self.reverse_adjacency[i].clone();
            strict.remove(&i);
            debug_assert!(!self.reverse_adjacency[i].is_empty());
            let mut parents = strict.iter();
            let first = *parents.next().expect("a non-entry block has a parent");
            let mut dom: BTreeSet<usize> = dominance[first].clone();
            dom.insert(first);
            for parent in strict.iter() {
                let mut with_parent = dominance[*parent].clone();
                with_parent.insert(*parent);
                dom = dom.intersection(&with_parent).copied().collect();
            }
            dominance.push(dom);
        }
        dominance
    }
}

/// Every single-entry DAG with `num_blocks` blocks.
pub fn generate_all_dags(num_blocks: usize) -> Vec<SingleEntryDag> {
    assert!(num_blocks >= 1, "a DAG needs at least one block");
    if num_blocks == 1 {
        return vec![
            SingleEntryDag::with_first(false),
            SingleEntryDag::with_first(true),
        ];
    }
    let previous = generate_all_dags(num_blocks - 1);
    let mut out = Vec::new();
    for dag in &previous {
        for parents in powerset(num_blocks) {
            if parents.iter().all(|p| *p >= num_blocks - 1) {
                continue;
            }
            let mut new_dag = dag.clone();
            new_dag.add_node(parents);
            out.push(new_dag);
        }
    }
    out
}

fn powerset(n: usize) -> impl Iterator<Item = BTreeSet<usize>> {
    (0u32..(1 << n)).map(move |mask| {
        (0..n)
            .filter(|i| mask & (1 << i) != 0)
            .collect::<BTreeSet<usize>>()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn one_block_dags() {
        let dags = generate_all_dags(1);
        assert_eq!(dags.len(), 2);
        assert!(dags[0].reverse_adjacency[0].is_empty());
        assert!(dags[1].reverse_adjacency[0].contains(&0));
    }

    #[test]
    fn dominance_of_a_chain() {
        // 0 -> 1 -> 2
        let mut dag = SingleEntryDag::with_first(false);
        dag.add_node(BTreeSet::from([0]));
        dag.add_node(BTreeSet::from([1]));
        let dominance = dag.dominance_list();
        assert!(dominance[0].is_empty());
        assert_eq!(dominance[1], BTreeSet::from([0]));
        assert_eq!(dominance[2], BTreeSet::from([0, 1]));
    }

    #[test]
    fn dominance_of_a_diamond() {
        // 0 -> {1, 2} -> 3
        let mut dag = SingleEntryDag::with_first(false);
        dag.add_node(BTreeSet::from([0]));
        dag.add_node(BTreeSet::from([0]));
        dag.add_node(BTreeSet::from([1, 2]));
        let dominance = dag.dominance_list();
        assert_eq!(dominance[3], BTreeSet::from([0]));
    }
}
