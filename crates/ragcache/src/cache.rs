//! The tree cache: MRU ordering, size-and-count eviction, and
//! single-flight downloads.
//!
//! Cache mutation happens under one mutex; per-tree download locks
//! serialize first use so two concurrent loads of the same absent tree
//! perform exactly one download. The just-loaded tree is never evicted
//! by its own insertion.

use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;

use ifox_domain::Result;

use crate::artifact::{read_tree, Tree};
use crate::fetch::TreeFetcher;

struct CacheInner {
    entries: HashMap<String, Arc<Tree>>,
    sizes: HashMap<String, u64>,
    /// LRU at front, MRU at back.
    order: VecDeque<String>,
}

impl CacheInner {
    fn total_bytes(&self) -> u64 {
        self.sizes.values().sum()
    }

    fn touch(&mut self, name: &str) {
        self.order.retain(|n| n != name);
        self.order.push_back(name.to_string());
    }

    fn remove(&mut self, name: &str) {
        self.entries.remove(name);
        self.sizes.remove(name);
        self.order.retain(|n| n != name);
    }
}

pub struct TreeCache {
    inner: Mutex<CacheInner>,
    download_locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
    fetcher: Arc<dyn TreeFetcher>,
    trees_dir: PathBuf,
    max_trees: usize,
    max_bytes: u64,
}

impl TreeCache {
    pub fn new(
        trees_dir: PathBuf,
        fetcher: Arc<dyn TreeFetcher>,
        max_trees: usize,
        max_bytes: u64,
    ) -> Self {
        Self {
            inner: Mutex::new(CacheInner {
                entries: HashMap::new(),
                sizes: HashMap::new(),
                order: VecDeque::new(),
            }),
            download_locks: Mutex::new(HashMap::new()),
            fetcher,
            trees_dir,
            max_trees,
            max_bytes,
        }
    }

    /// Load a tree: memory cache → local disk → remote store.
    pub async fn load(&self, name: &str) -> Result<Arc<Tree>> {
        // 1. Cache hit: bump to MRU.
        {
            let mut inner = self.inner.lock();
            if let Some(tree) = inner.entries.get(name).cloned() {
                inner.touch(name);
                tracing::debug!(tree = name, "cache hit");
                return Ok(tree);
            }
        }

        // 2. Local disk, else 3. download under the per-name lock.
        let path = match self.find_local(name) {
            Some(path) => path,
            None => {
                let lock = self.download_lock(name);
                let _guard = lock.lock().await;
                match self.find_local(name) {
                    Some(path) => {
                        tracing::info!(tree = name, "downloaded by a concurrent load");
                        path
                    }
                    None => {
                        tracing::info!(tree = name, "not found locally, fetching");
                        let dest = self.trees_dir.join(format!("{name}.tree"));
                        self.fetcher.fetch(name, &dest).await?;
                        dest
                    }
                }
            }
        };

        // 4. Decode off the I/O loop.
        let decode_name = name.to_string();
        let decode_path = path.clone();
        let tree = tokio::task::spawn_blocking(move || read_tree(&decode_name, &decode_path))
            .await
            .map_err(|e| ifox_domain::Error::Internal(format!("decode task: {e}")))??;
        let tree = Arc::new(tree);

        // 5 + 6. Evict, then insert at MRU.
        {
            let mut inner = self.inner.lock();
            // A concurrent load may have inserted while we decoded.
            if let Some(existing) = inner.entries.get(name).cloned() {
                inner.touch(name);
                return Ok(existing);
            }

            while inner.entries.len() >= self.max_trees
                || inner.total_bytes() + tree.bytes > self.max_bytes
            {
                let Some(oldest) = inner.order.front().cloned() else {
                    break;
                };
                tracing::info!(
                    evicted = %oldest,
                    incoming = name,
                    "evicting least-recently-used tree"
                );
                inner.remove(&oldest);
            }

            inner.entries.insert(name.to_string(), tree.clone());
            inner.sizes.insert(name.to_string(), tree.bytes);
            inner.touch(name);
            tracing::info!(
                tree = name,
                cached_trees = inner.entries.len(),
                cached_bytes = inner.total_bytes(),
                "tree loaded"
            );
        }

        Ok(tree)
    }

    /// Drop a tree from memory and disk (tree deletion path).
    pub fn evict_and_delete(&self, name: &str) -> Result<bool> {
        self.inner.lock().remove(name);
        let mut deleted = false;
        let flat = self.trees_dir.join(format!("{name}.tree"));
        if flat.exists() {
            std::fs::remove_file(&flat)?;
            deleted = true;
        }
        let nested = self.trees_dir.join(name);
        if nested.is_dir() {
            std::fs::remove_dir_all(&nested)?;
            deleted = true;
        }
        Ok(deleted)
    }

    /// Invalidate the in-memory entry (after add_documents rewrites
    /// the artifact).
    pub fn invalidate(&self, name: &str) {
        self.inner.lock().remove(name);
    }

    /// Trees currently resident, LRU first.
    pub fn cached(&self) -> Vec<(String, u64)> {
        let inner = self.inner.lock();
        inner
            .order
            .iter()
            .map(|name| (name.clone(), inner.sizes.get(name).copied().unwrap_or(0)))
            .collect()
    }

    pub fn total_bytes(&self) -> u64 {
        self.inner.lock().total_bytes()
    }

    /// Tree names present on local disk.
    pub fn list_local(&self) -> Vec<String> {
        let mut names = Vec::new();
        let Ok(entries) = std::fs::read_dir(&self.trees_dir) else {
            return names;
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().is_some_and(|e| e == "tree") {
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    names.push(stem.to_string());
                }
            } else if path.is_dir() {
                if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                    if path.join(format!("{name}.tree")).exists() {
                        names.push(name.to_string());
                    }
                }
            }
        }
        names.sort();
        names
    }

    pub fn trees_dir(&self) -> &Path {
        &self.trees_dir
    }

    fn find_local(&self, name: &str) -> Option<PathBuf> {
        let flat = self.trees_dir.join(format!("{name}.tree"));
        if flat.exists() {
            return Some(flat);
        }
        let nested = self.trees_dir.join(name).join(format!("{name}.tree"));
        if nested.exists() {
            return Some(nested);
        }
        None
    }

    fn download_lock(&self, name: &str) -> Arc<tokio::sync::Mutex<()>> {
        self.download_locks
            .lock()
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::{write_tree, TreeNode};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Serves trees of a configurable size and counts downloads.
    struct CountingFetcher {
        downloads: AtomicUsize,
        node_text_bytes: usize,
    }

    #[async_trait]
    impl TreeFetcher for CountingFetcher {
        async fn fetch(&self, name: &str, dest: &Path) -> Result<()> {
            self.downloads.fetch_add(1, Ordering::SeqCst);
            // Simulate a slow store so concurrent loads overlap.
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
            let nodes = vec![TreeNode {
                id: 0,
                layer: 0,
                text: format!("{name} {}", "x".repeat(self.node_text_bytes)),
                source: None,
                children: vec![],
            }];
            write_tree(dest, &nodes)?;
            Ok(())
        }
    }

    fn local_tree(dir: &Path, name: &str, text_bytes: usize) {
        let nodes = vec![TreeNode {
            id: 0,
            layer: 0,
            text: "x".repeat(text_bytes),
            source: None,
            children: vec![],
        }];
        write_tree(&dir.join(format!("{name}.tree")), &nodes).unwrap();
    }

    fn cache_with(
        dir: &tempfile::TempDir,
        max_trees: usize,
        max_bytes: u64,
    ) -> Arc<TreeCache> {
        Arc::new(TreeCache::new(
            dir.path().to_path_buf(),
            Arc::new(CountingFetcher {
                downloads: AtomicUsize::new(0),
                node_text_bytes: 64,
            }),
            max_trees,
            max_bytes,
        ))
    }

    #[tokio::test]
    async fn lru_eviction_by_count() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["a", "b", "c", "d"] {
            local_tree(dir.path(), name, 64);
        }
        let cache = cache_with(&dir, 3, u64::MAX);

        cache.load("a").await.unwrap();
        cache.load("b").await.unwrap();
        cache.load("c").await.unwrap();
        cache.load("d").await.unwrap();

        let names: Vec<String> = cache.cached().into_iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["b", "c", "d"], "a was LRU and must be gone");
    }

    #[tokio::test]
    async fn touching_a_tree_saves_it_from_eviction() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["a", "b", "c", "d"] {
            local_tree(dir.path(), name, 64);
        }
        let cache = cache_with(&dir, 3, u64::MAX);

        cache.load("a").await.unwrap();
        cache.load("b").await.unwrap();
        cache.load("c").await.unwrap();
        cache.load("a").await.unwrap(); // a becomes MRU
        cache.load("d").await.unwrap(); // evicts b

        let names: Vec<String> = cache.cached().into_iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["c", "a", "d"]);
    }

    #[tokio::test]
    async fn eviction_by_bytes_keeps_totals_under_limit() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["a", "b", "c", "d"] {
            // Each artifact lands around 2xx bytes on disk.
            local_tree(dir.path(), name, 150);
        }
        let cache = cache_with(&dir, 100, 700);

        for name in ["a", "b", "c", "d"] {
            cache.load(name).await.unwrap();
        }

        assert!(cache.total_bytes() <= 700);
        let names: Vec<String> = cache.cached().into_iter().map(|(n, _)| n).collect();
        assert!(names.contains(&"d".to_string()), "just-loaded tree stays");
        assert!(!names.contains(&"a".to_string()), "oldest evicted first");
    }

    #[tokio::test]
    async fn concurrent_loads_download_once() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = Arc::new(CountingFetcher {
            downloads: AtomicUsize::new(0),
            node_text_bytes: 16,
        });
        let cache = Arc::new(TreeCache::new(
            dir.path().to_path_buf(),
            fetcher.clone(),
            5,
            u64::MAX,
        ));

        let tasks: Vec<_> = (0..4)
            .map(|_| {
                let cache = cache.clone();
                tokio::spawn(async move { cache.load("shared").await })
            })
            .collect();
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        assert_eq!(fetcher.downloads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn nested_layout_is_found() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("k8s");
        std::fs::create_dir_all(&nested).unwrap();
        local_tree(&nested, "k8s", 32);
        // local_tree writes k8s.tree into the nested dir.
        let cache = cache_with(&dir, 5, u64::MAX);
        let tree = cache.load("k8s").await.unwrap();
        assert_eq!(tree.name, "k8s");
    }

    #[tokio::test]
    async fn delete_removes_memory_and_disk() {
        let dir = tempfile::tempdir().unwrap();
        local_tree(dir.path(), "a", 16);
        let cache = cache_with(&dir, 5, u64::MAX);
        cache.load("a").await.unwrap();

        assert!(cache.evict_and_delete("a").unwrap());
        assert!(cache.cached().is_empty());
        assert!(!dir.path().join("a.tree").exists());
    }
}
