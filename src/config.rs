/// Construction-time configuration for a [`crate::BPlusTreeMap`].
///
/// Both fields are read once, at construction, and fixed for the lifetime of
/// the tree: there is no live reconfiguration.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Config {
    /// Target byte budget per page. `LEAF_MAX`/`NODE_MAX` are derived from
    /// this so that one page fits the budget for the tree's `K`/`V` types.
    pub page_bytes: usize,
    /// Hard lower bound on the `MIN` fanout of any page, regardless of how
    /// generous `page_bytes` is. Keeps recursion shallow for tiny fanouts.
    pub min_fanout_floor: usize,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            page_bytes: 1024,
            min_fanout_floor: 4,
        }
    }
}

impl Config {
    pub(crate) fn validate(&self) -> Result<(), &'static str> {
        if self.min_fanout_floor < 2 {
            return Err("min_fanout_floor must be at least 2");
        }
        Ok(())
    }
}
