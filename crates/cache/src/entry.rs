//! Action cache entries
//!
//! An entry goes through two states. While an action runs, the executor
//! fills an [`EntryBuilder`] with the metadata of every input and output.
//! [`EntryBuilder::freeze`] then folds the accumulated metadata into a
//! single fingerprint and yields an immutable [`ActionCacheEntry`], which is
//! the only form the cache stores. Once frozen, an entry has no mutators, so
//! it can be shared across threads freely.
//!
//! ```compile_fail
//! use actcache_cache::{EntryBuilder, FileMetadata};
//!
//! let entry = EntryBuilder::new("action", Vec::<(String, String)>::new(), false).freeze();
//! entry.add_output_file("out/a", FileMetadata::Missing);
//! ```

use crate::digest::{Fingerprint, digest_environment, digest_metadata_map};
use crate::metadata::{FileMetadata, TreeArtifactValue};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

fn is_under(path: &str, tree: &str) -> bool {
    path.strip_prefix(tree)
        .is_some_and(|rest| rest.starts_with('/'))
}

/// An entry still being populated by a running action
#[derive(Debug, Clone)]
pub struct EntryBuilder {
    action_key: String,
    used_client_env_digest: Fingerprint,
    discovered_inputs: Option<Vec<String>>,
    output_files: BTreeMap<String, FileMetadata>,
    output_trees: BTreeMap<String, TreeArtifactValue>,
    md_map: BTreeMap<String, FileMetadata>,
}

impl EntryBuilder {
    /// Start an entry for an action
    ///
    /// `used_client_env` is the subset of the client environment the action
    /// declared as relevant; only its digest is kept. `discovers_inputs`
    /// decides whether input paths are recorded at all.
    pub fn new<I, K, V>(
        action_key: impl Into<String>,
        used_client_env: I,
        discovers_inputs: bool,
    ) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        Self {
            action_key: action_key.into(),
            used_client_env_digest: digest_environment(used_client_env),
            discovered_inputs: discovers_inputs.then(Vec::new),
            output_files: BTreeMap::new(),
            output_trees: BTreeMap::new(),
            md_map: BTreeMap::new(),
        }
    }

    /// Record the metadata of a plain output file
    ///
    /// # Panics
    ///
    /// Panics if `path` is a tree artifact, a child of a recorded tree
    /// artifact, or if `metadata` describes a tree. Trees go through
    /// [`Self::add_output_tree`].
    pub fn add_output_file(&mut self, path: impl Into<String>, metadata: FileMetadata) {
        let path = path.into();
        assert!(
            !matches!(metadata, FileMetadata::Tree { .. }),
            "Must use add_output_tree to save tree artifacts and their children: {path}"
        );
        assert!(
            !self.output_trees.contains_key(&path)
                && !self.output_trees.keys().any(|tree| is_under(&path, tree)),
            "Must use add_output_tree to save tree artifacts and their children: {path}"
        );
        self.output_files.insert(path.clone(), metadata.clone());
        self.md_map.insert(path, metadata);
    }

    /// Record a tree artifact output
    ///
    /// The children are kept so [`ActionCacheEntry::output_tree`] can hand
    /// them back; the fingerprint only sees the tree's aggregate metadata.
    ///
    /// # Panics
    ///
    /// Panics if `path`, or any path below it, was recorded as an output file.
    pub fn add_output_tree(&mut self, path: impl Into<String>, tree: TreeArtifactValue) {
        let path = path.into();
        assert!(
            !self.output_files.contains_key(&path)
                && !self.output_files.keys().any(|file| is_under(file, &path)),
            "artifact must be a tree artifact, already recorded as an output file: {path}"
        );
        self.md_map.insert(path.clone(), tree.metadata());
        self.output_trees.insert(path, tree);
    }

    /// Record the metadata of an input file
    ///
    /// For input-discovering actions, `save_exec_path` appends the path to the
    /// discovered-input list (duplicates are kept, in insertion order).
    pub fn add_input_file(
        &mut self,
        path: impl Into<String>,
        metadata: FileMetadata,
        save_exec_path: bool,
    ) {
        let path = path.into();
        if save_exec_path && let Some(files) = self.discovered_inputs.as_mut() {
            files.push(path.clone());
        }
        self.md_map.insert(path, metadata);
    }

    /// The action key this entry was started with
    #[must_use]
    pub fn action_key(&self) -> &str {
        &self.action_key
    }

    /// Whether the action discovers its inputs dynamically
    #[must_use]
    pub const fn discovers_inputs(&self) -> bool {
        self.discovered_inputs.is_some()
    }

    /// Digest of the metadata recorded so far, without freezing
    #[must_use]
    pub fn preview_digest(&self) -> Fingerprint {
        digest_metadata_map(&self.md_map)
    }

    /// Compute the entry fingerprint and discard the working metadata map
    #[must_use]
    pub fn freeze(self) -> ActionCacheEntry {
        let file_digest = digest_metadata_map(&self.md_map);
        ActionCacheEntry {
            action_key: self.action_key,
            used_client_env_digest: self.used_client_env_digest,
            discovered_inputs: self.discovered_inputs,
            file_digest,
            output_files: self.output_files,
            output_trees: self.output_trees,
        }
    }
}

/// A frozen action cache entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionCacheEntry {
    action_key: String,
    used_client_env_digest: Fingerprint,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    discovered_inputs: Option<Vec<String>>,
    file_digest: Fingerprint,
    #[serde(default)]
    output_files: BTreeMap<String, FileMetadata>,
    #[serde(default)]
    output_trees: BTreeMap<String, TreeArtifactValue>,
}

impl ActionCacheEntry {
    /// Reassemble an entry from its stored fields
    #[must_use]
    pub fn from_parts(
        action_key: impl Into<String>,
        used_client_env_digest: Fingerprint,
        discovered_inputs: Option<Vec<String>>,
        file_digest: Fingerprint,
        output_files: BTreeMap<String, FileMetadata>,
        output_trees: BTreeMap<String, TreeArtifactValue>,
    ) -> Self {
        Self {
            action_key: action_key.into(),
            used_client_env_digest,
            discovered_inputs,
            file_digest,
            output_files,
            output_trees,
        }
    }

    /// Fingerprint of the action's static definition
    #[must_use]
    pub fn action_key(&self) -> &str {
        &self.action_key
    }

    /// Digest of the client environment the action used
    #[must_use]
    pub const fn used_client_env_digest(&self) -> &Fingerprint {
        &self.used_client_env_digest
    }

    /// Combined digest of every input and output recorded before freezing
    #[must_use]
    pub const fn file_digest(&self) -> &Fingerprint {
        &self.file_digest
    }

    /// Whether the action discovers its inputs dynamically
    #[must_use]
    pub const fn discovers_inputs(&self) -> bool {
        self.discovered_inputs.is_some()
    }

    /// Discovered input paths; empty when the action does not discover inputs
    #[must_use]
    pub fn paths(&self) -> &[String] {
        self.discovered_inputs.as_deref().unwrap_or_default()
    }

    /// Metadata of one output file
    #[must_use]
    pub fn output_file(&self, path: &str) -> Option<&FileMetadata> {
        self.output_files.get(path)
    }

    /// All output file records
    #[must_use]
    pub fn output_files(&self) -> &BTreeMap<String, FileMetadata> {
        &self.output_files
    }

    /// Children of one output tree
    #[must_use]
    pub fn output_tree(&self, path: &str) -> Option<&TreeArtifactValue> {
        self.output_trees.get(path)
    }

    /// All output tree records
    #[must_use]
    pub fn output_trees(&self) -> &BTreeMap<String, TreeArtifactValue> {
        &self.output_trees
    }

    /// False if file and tree outputs overlap, which a builder never produces
    pub(crate) fn is_consistent(&self) -> bool {
        self.output_files.keys().all(|file| {
            !self.output_trees.contains_key(file)
                && !self.output_trees.keys().any(|tree| is_under(file, tree))
        })
    }
}

impl fmt::Display for ActionCacheEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "      actionKey = {}", self.action_key)?;
        writeln!(f, "      usedClientEnvKey = {}", self.used_client_env_digest)?;
        writeln!(f, "      digestKey = {}", self.file_digest)?;
        if let Some(files) = &self.discovered_inputs {
            let mut sorted: Vec<&String> = files.iter().collect();
            sorted.sort();
            for path in sorted {
                writeln!(f, "      {path}")?;
            }
        }
        for (path, metadata) in &self.output_files {
            writeln!(f, "      {path} = {metadata}")?;
        }
        for (path, tree) in &self.output_trees {
            writeln!(f, "      {path} = tree({} children)", tree.len())?;
            for (child, metadata) in tree.children() {
                writeln!(f, "        {child} = {metadata}")?;
            }
        }
        Ok(())
    }
}
