//! The vault namespace as a tree of directories and files.
//!
//! The tree holds names and storage references only; payloads live in
//! separate objects. It is persisted as one JSON document (see
//! [`crate::index::Index`]).
//!
//! Every mutating method validates before it changes anything, so an error
//! leaves the tree as it was.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use uuid::Uuid;

use crate::config::OBJECT_EXTENSION;
use keepsafe_common::{Error, Result, VaultPath};

/// Name of the root directory.
pub const ROOT_NAME: &str = "/";

/// Identifier of one encrypted payload object.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct StorageRef(String);

impl StorageRef {
    /// A fresh random reference.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    /// Validate an existing reference.
    ///
    /// References are 1 to 64 ASCII alphanumerics, `-` or `_`, so they can
    /// never name a path outside the vault.
    pub fn parse(s: &str) -> Result<Self> {
        let valid = !s.is_empty()
            && s.len() <= 64
            && s.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !valid {
            return Err(Error::Serialization(format!(
                "Invalid storage reference: {:?}",
                s
            )));
        }
        Ok(Self(s.to_string()))
    }

    /// The reference as a string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Name of the storage object holding the payload.
    pub fn object_name(&self) -> String {
        format!("{}.{}", self.0, OBJECT_EXTENSION)
    }

    /// Recover the reference from an object name, if it is one.
    pub fn from_object_name(name: &str) -> Option<Self> {
        let stem = name.strip_suffix(OBJECT_EXTENSION)?.strip_suffix('.')?;
        Self::parse(stem).ok()
    }
}

impl TryFrom<String> for StorageRef {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<StorageRef> for String {
    fn from(value: StorageRef) -> Self {
        value.0
    }
}

impl fmt::Display for StorageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A file entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileEntry {
    /// File name.
    pub name: String,
    /// Object holding the encrypted payload.
    pub storage_ref: StorageRef,
    /// Plaintext size in bytes.
    pub size: u64,
    /// Time the payload was last written.
    pub modified_at: DateTime<Utc>,
}

/// A directory and its children, keyed by name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Directory {
    /// Directory name (`/` for the root).
    pub name: String,
    /// Children in name order.
    #[serde(default)]
    pub children: BTreeMap<String, Node>,
}

impl Directory {
    /// An empty directory.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            children: BTreeMap::new(),
        }
    }

    /// Every file in this subtree.
    pub fn files(&self) -> Vec<&FileEntry> {
        let mut out = Vec::new();
        let mut stack = vec![self];
        while let Some(dir) = stack.pop() {
            for node in dir.children.values() {
                match node {
                    Node::Directory(child) => stack.push(child),
                    Node::File(file) => out.push(file),
                }
            }
        }
        out
    }

    fn files_mut(&mut self) -> Vec<&mut FileEntry> {
        let mut out = Vec::new();
        let mut stack = vec![self];
        while let Some(dir) = stack.pop() {
            for node in dir.children.values_mut() {
                match node {
                    Node::Directory(child) => stack.push(child),
                    Node::File(file) => out.push(file),
                }
            }
        }
        out
    }

    /// Number of files in this subtree.
    pub fn file_count(&self) -> usize {
        self.files().len()
    }

    /// Total plaintext size of this subtree.
    pub fn total_size(&self) -> u64 {
        self.files().iter().map(|f| f.size).sum()
    }

    fn validate(&self, seen: &mut HashSet<StorageRef>) -> Result<()> {
        for (key, node) in &self.children {
            if key != node.name() {
                return Err(Error::Serialization(format!(
                    "Index entry {:?} is named {:?}",
                    key,
                    node.name()
                )));
            }
            VaultPath::root()
                .join(key)
                .map_err(|e| Error::Serialization(format!("Invalid index entry name: {}", e)))?;

            match node {
                Node::Directory(dir) => dir.validate(seen)?,
                Node::File(file) => {
                    if !seen.insert(file.storage_ref.clone()) {
                        return Err(Error::Serialization(format!(
                            "Storage reference {} is used twice",
                            file.storage_ref
                        )));
                    }
                }
            }
        }
        Ok(())
    }
}

/// A node in the tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Node {
    Directory(Directory),
    File(FileEntry),
}

impl Node {
    /// The node's name.
    pub fn name(&self) -> &str {
        match self {
            Node::Directory(dir) => &dir.name,
            Node::File(file) => &file.name,
        }
    }

    fn set_name(&mut self, name: &str) {
        match self {
            Node::Directory(dir) => dir.name = name.to_string(),
            Node::File(file) => file.name = name.to_string(),
        }
    }

    /// Borrowed view of the node.
    pub fn view(&self) -> NodeRef<'_> {
        match self {
            Node::Directory(dir) => NodeRef::Directory(dir),
            Node::File(file) => NodeRef::File(file),
        }
    }
}

/// Borrowed view of a resolved node. The root resolves to a directory that
/// is not stored as a [`Node`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NodeRef<'a> {
    Directory(&'a Directory),
    File(&'a FileEntry),
}

/// The whole namespace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IndexTree {
    root: Directory,
}

fn prefix(components: &[String]) -> String {
    format!("/{}", components.join("/"))
}

fn split_last(path: &VaultPath) -> Option<(&[String], &str)> {
    path.components()
        .split_last()
        .map(|(last, parents)| (parents, last.as_str()))
}

impl IndexTree {
    /// Create a tree holding only the root directory.
    pub fn new() -> Self {
        Self {
            root: Directory::new(ROOT_NAME),
        }
    }

    /// The root directory.
    pub fn root(&self) -> &Directory {
        &self.root
    }

    /// Walk to an existing directory.
    ///
    /// # Errors
    /// - `DirectoryNotFound` if a segment is missing
    /// - `NotADirectory` if a segment is a file
    fn walk(&self, components: &[String]) -> Result<&Directory> {
        let mut current = &self.root;
        for (i, component) in components.iter().enumerate() {
            current = match current.children.get(component) {
                Some(Node::Directory(dir)) => dir,
                Some(Node::File(_)) => {
                    return Err(Error::NotADirectory(prefix(&components[..=i])))
                }
                None => return Err(Error::DirectoryNotFound(prefix(&components[..=i]))),
            };
        }
        Ok(current)
    }

    /// Fail if some existing segment of `components` is a file, so that a
    /// later `walk_mut(.., true)` cannot fail.
    fn check_creatable(&self, components: &[String]) -> Result<()> {
        let mut current = &self.root;
        for (i, component) in components.iter().enumerate() {
            current = match current.children.get(component) {
                Some(Node::Directory(dir)) => dir,
                Some(Node::File(_)) => {
                    return Err(Error::NotADirectory(prefix(&components[..=i])))
                }
                None => return Ok(()),
            };
        }
        Ok(())
    }

    /// Walk to a directory, creating missing segments when `create` is set.
    fn walk_mut(&mut self, components: &[String], create: bool) -> Result<&mut Directory> {
        let mut current = &mut self.root;
        for (i, component) in components.iter().enumerate() {
            let node = if create {
                current
                    .children
                    .entry(component.clone())
                    .or_insert_with(|| Node::Directory(Directory::new(component.as_str())))
            } else {
                current
                    .children
                    .get_mut(component)
                    .ok_or_else(|| Error::DirectoryNotFound(prefix(&components[..=i])))?
            };
            current = match node {
                Node::Directory(dir) => dir,
                Node::File(_) => return Err(Error::NotADirectory(prefix(&components[..=i]))),
            };
        }
        Ok(current)
    }

    /// Resolve a path to its node.
    ///
    /// # Errors
    /// - `DirectoryNotFound` if a non-terminal segment is missing
    /// - `NotADirectory` if a non-terminal segment is a file
    /// - `NotFound` if the terminal segment is missing
    pub fn resolve(&self, path: &VaultPath) -> Result<NodeRef<'_>> {
        let Some((parents, name)) = split_last(path) else {
            return Ok(NodeRef::Directory(&self.root));
        };

        self.walk(parents)?
            .children
            .get(name)
            .map(Node::view)
            .ok_or_else(|| Error::NotFound(path.to_string()))
    }

    /// Resolve a path that must be a directory.
    pub fn directory(&self, path: &VaultPath) -> Result<&Directory> {
        match self.resolve(path) {
            Ok(NodeRef::Directory(dir)) => Ok(dir),
            Ok(NodeRef::File(_)) => Err(Error::NotADirectory(path.to_string())),
            Err(Error::NotFound(p)) => Err(Error::DirectoryNotFound(p)),
            Err(e) => Err(e),
        }
    }

    /// Resolve a path that must be a file.
    pub fn file(&self, path: &VaultPath) -> Result<&FileEntry> {
        match self.resolve(path) {
            Ok(NodeRef::File(file)) => Ok(file),
            Ok(NodeRef::Directory(_)) => Err(Error::NotAFile(path.to_string())),
            Err(e) if e.is_not_found() => Err(Error::FileNotFound(path.to_string())),
            Err(e) => Err(e),
        }
    }

    /// Whether `path` names an existing directory.
    pub fn directory_exists(&self, path: &VaultPath) -> bool {
        matches!(self.resolve(path), Ok(NodeRef::Directory(_)))
    }

    /// Create a directory and any missing parents. Succeeds if it already
    /// exists.
    ///
    /// # Errors
    /// - `NotADirectory` if any segment, including the last, is a file
    pub fn create_directory(&mut self, path: &VaultPath) -> Result<()> {
        self.check_creatable(path.components())?;
        self.walk_mut(path.components(), true)?;
        Ok(())
    }

    /// Set the file at `path`, creating missing parent directories.
    ///
    /// Returns the entry it replaced, if any.
    ///
    /// # Errors
    /// - `InvalidInput` for the root path
    /// - `NotAFile` if `path` is a directory
    /// - `NotADirectory` if a parent segment is a file
    pub fn add_file(
        &mut self,
        path: &VaultPath,
        storage_ref: StorageRef,
        size: u64,
    ) -> Result<Option<FileEntry>> {
        let (parents, name) = split_last(path)
            .ok_or_else(|| Error::InvalidInput("Cannot add a file at the root".to_string()))?;

        self.check_creatable(parents)?;
        if let Ok(NodeRef::Directory(_)) = self.resolve(path) {
            return Err(Error::NotAFile(path.to_string()));
        }

        let entry = FileEntry {
            name: name.to_string(),
            storage_ref,
            size,
            modified_at: Utc::now(),
        };
        let parent = self.walk_mut(parents, true)?;
        match parent.children.insert(name.to_string(), Node::File(entry)) {
            Some(Node::File(old)) => Ok(Some(old)),
            _ => Ok(None),
        }
    }

    /// Remove the file at `path`.
    ///
    /// Returns `None` without error if there is no such file.
    ///
    /// # Errors
    /// - `NotAFile` if `path` is a directory
    /// - `NotADirectory` if a parent segment is a file
    pub fn remove_file(&mut self, path: &VaultPath) -> Result<Option<FileEntry>> {
        let Some((parents, name)) = split_last(path) else {
            return Err(Error::NotAFile(path.to_string()));
        };

        let parent = match self.walk_mut(parents, false) {
            Ok(parent) => parent,
            Err(Error::DirectoryNotFound(_)) => return Ok(None),
            Err(e) => return Err(e),
        };

        match parent.children.get(name) {
            None => return Ok(None),
            Some(Node::Directory(_)) => return Err(Error::NotAFile(path.to_string())),
            Some(Node::File(_)) => {}
        }
        match parent.children.remove(name) {
            Some(Node::File(file)) => Ok(Some(file)),
            _ => Ok(None),
        }
    }

    /// Remove the directory at `path` with everything beneath it.
    ///
    /// # Errors
    /// - `InvalidInput` for the root
    /// - `DirectoryNotFound` if it does not exist
    /// - `NotADirectory` if `path` is a file
    pub fn remove_directory(&mut self, path: &VaultPath) -> Result<Directory> {
        let (parents, name) = split_last(path)
            .ok_or_else(|| Error::InvalidInput("Cannot remove the root directory".to_string()))?;

        let parent = self.walk_mut(parents, false)?;
        match parent.children.get(name) {
            None => return Err(Error::DirectoryNotFound(path.to_string())),
            Some(Node::File(_)) => return Err(Error::NotADirectory(path.to_string())),
            Some(Node::Directory(_)) => {}
        }
        match parent.children.remove(name) {
            Some(Node::Directory(dir)) => Ok(dir),
            _ => Err(Error::DirectoryNotFound(path.to_string())),
        }
    }

    /// Move the directory at `old` to `new`, creating missing parents of
    /// `new`.
    ///
    /// # Errors
    /// - `InvalidInput` if either path is the root or `new` lies inside `old`
    /// - `DirectoryNotFound` / `NotADirectory` if `old` is not a directory
    /// - `AlreadyExists` if `new` exists
    pub fn rename_directory(&mut self, old: &VaultPath, new: &VaultPath) -> Result<()> {
        if old.is_root() || new.is_root() {
            return Err(Error::InvalidInput(
                "Cannot rename the root directory".to_string(),
            ));
        }
        self.directory(old)?;
        if old == new {
            return Ok(());
        }
        if new.starts_with(old) {
            return Err(Error::InvalidInput(format!(
                "Cannot move {} into itself",
                old
            )));
        }
        if self.resolve(new).is_ok() {
            return Err(Error::AlreadyExists(new.to_string()));
        }

        let (new_parents, new_name) = split_last(new)
            .ok_or_else(|| Error::InvalidInput("Cannot rename to the root".to_string()))?;
        self.check_creatable(new_parents)?;

        self.reattach(old, new_parents, new_name)
    }

    /// Move the file at `src` to `dest`, creating missing parents.
    ///
    /// If `dest` is an existing directory the file moves into it under its
    /// current name. Returns the file's new path.
    ///
    /// # Errors
    /// - `FileNotFound` if `src` does not exist
    /// - `NotAFile` if `src` is a directory
    /// - `AlreadyExists` if the target is taken
    pub fn move_file(&mut self, src: &VaultPath, dest: &VaultPath) -> Result<VaultPath> {
        let file = self.file(src)?;
        let name = file.name.clone();

        let target = match self.resolve(dest) {
            Ok(NodeRef::Directory(_)) => dest.join(&name)?,
            Ok(NodeRef::File(_)) if dest == src => return Ok(src.clone()),
            Ok(NodeRef::File(_)) => return Err(Error::AlreadyExists(dest.to_string())),
            Err(e) if e.is_not_found() => dest.clone(),
            Err(e) => return Err(e),
        };

        if &target == src {
            return Ok(target);
        }
        if self.resolve(&target).is_ok() {
            return Err(Error::AlreadyExists(target.to_string()));
        }

        let (parents, target_name) = split_last(&target)
            .ok_or_else(|| Error::InvalidInput("Cannot move a file to the root".to_string()))?;
        self.check_creatable(parents)?;

        self.reattach(src, parents, target_name)?;
        Ok(target)
    }

    /// Detach the node at `from` and insert it as `name` under `parents`.
    /// Callers have already validated both ends.
    fn reattach(&mut self, from: &VaultPath, parents: &[String], name: &str) -> Result<()> {
        let (from_parents, from_name) = split_last(from)
            .ok_or_else(|| Error::InvalidInput("Cannot detach the root".to_string()))?;

        let mut node = self
            .walk_mut(from_parents, false)?
            .children
            .remove(from_name)
            .ok_or_else(|| Error::NotFound(from.to_string()))?;
        node.set_name(name);

        self.walk_mut(parents, true)?
            .children
            .insert(name.to_string(), node);
        Ok(())
    }

    /// A copy of the whole namespace.
    pub fn snapshot(&self) -> Directory {
        self.root.clone()
    }

    /// Every file in the tree.
    pub fn files(&self) -> Vec<&FileEntry> {
        self.root.files()
    }

    pub(crate) fn files_mut(&mut self) -> Vec<&mut FileEntry> {
        self.root.files_mut()
    }

    /// Serialize tree to JSON.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| Error::Serialization(e.to_string()))
    }

    /// Deserialize and validate a tree.
    ///
    /// # Errors
    /// - `Serialization` if the document is malformed, the root is not named
    ///   `/`, a child's key differs from its name, or two files share a
    ///   storage reference
    pub fn from_json(json: &str) -> Result<Self> {
        let tree: Self =
            serde_json::from_str(json).map_err(|e| Error::Serialization(e.to_string()))?;

        if tree.root.name != ROOT_NAME {
            return Err(Error::Serialization(format!(
                "Root directory is named {:?}",
                tree.root.name
            )));
        }
        tree.root.validate(&mut HashSet::new())?;
        Ok(tree)
    }
}

impl Default for IndexTree {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn p(path: &str) -> VaultPath {
        VaultPath::parse(path).unwrap()
    }

    fn add(tree: &mut IndexTree, path: &str) -> StorageRef {
        let storage_ref = StorageRef::generate();
        tree.add_file(&p(path), storage_ref.clone(), 1).unwrap();
        storage_ref
    }

    #[test]
    fn test_tree_creation() {
        let tree = IndexTree::new();
        assert_eq!(tree.root().name, "/");
        assert!(tree.directory_exists(&VaultPath::root()));
        assert!(tree.files().is_empty());
    }

    #[test]
    fn test_add_file_creates_parents() {
        let mut tree = IndexTree::new();
        let storage_ref = add(&mut tree, "docs/reports/q1.txt");

        assert!(tree.directory_exists(&p("docs")));
        assert!(tree.directory_exists(&p("docs/reports")));
        match tree.resolve(&p("docs/reports/q1.txt")).unwrap() {
            NodeRef::File(file) => {
                assert_eq!(file.name, "q1.txt");
                assert_eq!(file.storage_ref, storage_ref);
            }
            other => panic!("expected file, got {:?}", other),
        }
    }

    #[test]
    fn test_add_file_replaces() {
        let mut tree = IndexTree::new();
        let first = add(&mut tree, "a.txt");

        let replaced = tree
            .add_file(&p("a.txt"), StorageRef::generate(), 5)
            .unwrap()
            .unwrap();
        assert_eq!(replaced.storage_ref, first);
        assert_eq!(tree.file(&p("a.txt")).unwrap().size, 5);
    }

    #[test]
    fn test_add_file_conflicts() {
        let mut tree = IndexTree::new();
        tree.create_directory(&p("dir")).unwrap();
        add(&mut tree, "file");

        assert!(matches!(
            tree.add_file(&p("dir"), StorageRef::generate(), 1),
            Err(Error::NotAFile(_))
        ));
        assert!(matches!(
            tree.add_file(&p("file/child"), StorageRef::generate(), 1),
            Err(Error::NotADirectory(_))
        ));
        assert!(matches!(
            tree.add_file(&VaultPath::root(), StorageRef::generate(), 1),
            Err(Error::InvalidInput(_))
        ));
    }

    #[test]
    fn test_resolve_errors() {
        let mut tree = IndexTree::new();
        add(&mut tree, "a/file");

        assert!(matches!(
            tree.resolve(&p("missing/x")),
            Err(Error::DirectoryNotFound(_))
        ));
        assert!(matches!(tree.resolve(&p("a/missing")), Err(Error::NotFound(_))));
        assert!(matches!(
            tree.resolve(&p("a/file/x")),
            Err(Error::NotADirectory(_))
        ));
    }

    #[test]
    fn test_create_directory_idempotent() {
        let mut tree = IndexTree::new();
        tree.create_directory(&p("x/y/z")).unwrap();
        let before = tree.clone();

        tree.create_directory(&p("x/y/z")).unwrap();
        tree.create_directory(&p("x/y")).unwrap();
        assert_eq!(tree, before);
    }

    #[test]
    fn test_create_directory_over_file_leaves_tree_unchanged() {
        let mut tree = IndexTree::new();
        add(&mut tree, "a/file");
        let before = tree.clone();

        assert!(matches!(
            tree.create_directory(&p("a/file")),
            Err(Error::NotADirectory(_))
        ));
        assert!(matches!(
            tree.create_directory(&p("a/file/sub/deeper")),
            Err(Error::NotADirectory(_))
        ));
        assert_eq!(tree, before);
    }

    #[test]
    fn test_remove_file() {
        let mut tree = IndexTree::new();
        let storage_ref = add(&mut tree, "d/f");

        assert!(tree.remove_file(&p("d/absent")).unwrap().is_none());
        assert!(tree.remove_file(&p("nowhere/absent")).unwrap().is_none());
        assert!(matches!(tree.remove_file(&p("d")), Err(Error::NotAFile(_))));

        let removed = tree.remove_file(&p("d/f")).unwrap().unwrap();
        assert_eq!(removed.storage_ref, storage_ref);
        assert!(tree.directory_exists(&p("d")));
    }

    #[test]
    fn test_remove_directory_cascades() {
        let mut tree = IndexTree::new();
        add(&mut tree, "a/x");
        add(&mut tree, "a/b/y");
        add(&mut tree, "keep");

        let removed = tree.remove_directory(&p("a")).unwrap();
        assert_eq!(removed.file_count(), 2);

        assert!(matches!(
            tree.resolve(&p("a/x")),
            Err(Error::DirectoryNotFound(_))
        ));
        assert_eq!(tree.files().len(), 1);
    }

    #[test]
    fn test_remove_directory_errors() {
        let mut tree = IndexTree::new();
        add(&mut tree, "file");

        assert!(matches!(
            tree.remove_directory(&VaultPath::root()),
            Err(Error::InvalidInput(_))
        ));
        assert!(matches!(
            tree.remove_directory(&p("missing")),
            Err(Error::DirectoryNotFound(_))
        ));
        assert!(matches!(
            tree.remove_directory(&p("file")),
            Err(Error::NotADirectory(_))
        ));
    }

    #[test]
    fn test_rename_directory_keeps_children() {
        let mut tree = IndexTree::new();
        let storage_ref = add(&mut tree, "old/sub/f");

        tree.rename_directory(&p("old"), &p("new/place")).unwrap();

        assert!(!tree.directory_exists(&p("old")));
        assert_eq!(tree.directory(&p("new/place")).unwrap().name, "place");
        assert_eq!(
            tree.file(&p("new/place/sub/f")).unwrap().storage_ref,
            storage_ref
        );
    }

    #[test]
    fn test_rename_directory_errors() {
        let mut tree = IndexTree::new();
        tree.create_directory(&p("a/b")).unwrap();
        tree.create_directory(&p("c")).unwrap();
        add(&mut tree, "f");
        let before = tree.clone();

        assert!(matches!(
            tree.rename_directory(&p("a"), &p("a/b/inner")),
            Err(Error::InvalidInput(_))
        ));
        assert!(matches!(
            tree.rename_directory(&p("a"), &p("c")),
            Err(Error::AlreadyExists(_))
        ));
        assert!(matches!(
            tree.rename_directory(&p("f"), &p("g")),
            Err(Error::NotADirectory(_))
        ));
        assert!(matches!(
            tree.rename_directory(&p("missing"), &p("g")),
            Err(Error::DirectoryNotFound(_))
        ));
        assert!(matches!(
            tree.rename_directory(&p("a"), &p("f/under")),
            Err(Error::NotADirectory(_))
        ));
        assert!(matches!(
            tree.rename_directory(&VaultPath::root(), &p("x")),
            Err(Error::InvalidInput(_))
        ));
        tree.rename_directory(&p("a"), &p("a")).unwrap();

        assert_eq!(tree, before);
    }

    #[test]
    fn test_move_file() {
        let mut tree = IndexTree::new();
        let storage_ref = add(&mut tree, "src/f.txt");

        let target = tree.move_file(&p("src/f.txt"), &p("dst/g.txt")).unwrap();
        assert_eq!(target, p("dst/g.txt"));
        assert!(matches!(
            tree.resolve(&p("src/f.txt")),
            Err(Error::NotFound(_))
        ));
        let moved = tree.file(&p("dst/g.txt")).unwrap();
        assert_eq!(moved.name, "g.txt");
        assert_eq!(moved.storage_ref, storage_ref);
    }

    #[test]
    fn test_move_file_into_directory() {
        let mut tree = IndexTree::new();
        add(&mut tree, "f.txt");
        tree.create_directory(&p("archive")).unwrap();

        let target = tree.move_file(&p("f.txt"), &p("archive")).unwrap();
        assert_eq!(target, p("archive/f.txt"));
        assert!(tree.file(&p("archive/f.txt")).is_ok());
    }

    #[test]
    fn test_move_file_errors() {
        let mut tree = IndexTree::new();
        add(&mut tree, "a");
        add(&mut tree, "b");
        add(&mut tree, "dir/a");
        let before = tree.clone();

        assert!(matches!(
            tree.move_file(&p("missing"), &p("x")),
            Err(Error::FileNotFound(_))
        ));
        assert!(matches!(
            tree.move_file(&p("dir"), &p("x")),
            Err(Error::NotAFile(_))
        ));
        assert!(matches!(
            tree.move_file(&p("a"), &p("b")),
            Err(Error::AlreadyExists(_))
        ));
        assert!(matches!(
            tree.move_file(&p("a"), &p("dir")),
            Err(Error::AlreadyExists(_))
        ));
        assert_eq!(tree.move_file(&p("a"), &p("a")).unwrap(), p("a"));
        assert_eq!(tree, before);
    }

    #[test]
    fn test_json_roundtrip_and_shape() {
        let mut tree = IndexTree::new();
        add(&mut tree, "docs/readme");

        let json = tree.to_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["name"], "/");
        assert_eq!(value["children"]["docs"]["type"], "directory");
        assert_eq!(value["children"]["docs"]["children"]["readme"]["type"], "file");

        assert_eq!(IndexTree::from_json(&json).unwrap(), tree);
    }

    #[test]
    fn test_from_json_validation() {
        let mismatched = r#"{"name":"/","children":{"a":{"type":"directory","name":"b","children":{}}}}"#;
        assert!(matches!(
            IndexTree::from_json(mismatched),
            Err(Error::Serialization(_))
        ));

        let bad_ref = r#"{"name":"/","children":{"f":{"type":"file","name":"f","storage_ref":"../x","size":1,"modified_at":"2024-01-01T00:00:00Z"}}}"#;
        assert!(matches!(
            IndexTree::from_json(bad_ref),
            Err(Error::Serialization(_))
        ));

        let bad_root = r#"{"name":"root","children":{}}"#;
        assert!(IndexTree::from_json(bad_root).is_err());
    }

    #[test]
    fn test_storage_ref_object_names() {
        let storage_ref = StorageRef::generate();
        let name = storage_ref.object_name();

        assert!(name.ends_with(".enc"));
        assert_eq!(StorageRef::from_object_name(&name), Some(storage_ref));
        assert_eq!(StorageRef::from_object_name("keypair.pem"), None);
        assert_eq!(StorageRef::from_object_name("x.enc.bak"), None);
        assert_eq!(StorageRef::from_object_name(".enc"), None);
    }

    fn segment() -> impl Strategy<Value = String> {
        "[a-z]{1,4}"
    }

    proptest! {
        #[test]
        fn prop_json_preserves_tree(
            paths in proptest::collection::vec(proptest::collection::vec(segment(), 1..4), 0..12)
        ) {
            let mut tree = IndexTree::new();
            for components in paths {
                let path = VaultPath::from_components(components).unwrap();
                // Paths colliding with earlier ones are skipped.
                let _ = tree.add_file(&path, StorageRef::generate(), 3);
            }

            let restored = IndexTree::from_json(&tree.to_json().unwrap()).unwrap();
            prop_assert_eq!(restored, tree);
        }
    }
}
