use std::collections::BTreeMap;

use aws_smithy_types_convert::date_time::DateTimeExt;

use crate::types::ObjectDescriptor;

const INDENT: &str = "    ";

#[derive(Debug, Default, PartialEq)]
pub struct FolderNode {
    pub name: String,
    pub folders: BTreeMap<String, FolderNode>,
    pub files: Vec<FileNode>,
}

#[derive(Debug, PartialEq)]
pub struct FileNode {
    pub name: String,
    pub size: u64,
    pub last_modified: String,
}

impl FolderNode {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Default::default()
        }
    }

    fn entry_count(&self) -> usize {
        self.folders.len() + self.files.len()
    }
}

/// Builds a folder tree out of a flat listing under `prefix`.
///
/// The tree is rooted at the folder part of `prefix` (up to its last `/`); the rest of
/// the prefix only filters names. The root is named after that folder, or the bucket
/// when there is none. Keys ending in `/` only contribute folders.
pub fn build_key_tree(bucket: &str, prefix: &str, objects: &[ObjectDescriptor]) -> FolderNode {
    let folder_prefix = prefix.rfind('/').map_or("", |index| &prefix[..=index]);
    let root_name = folder_prefix
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .filter(|name| !name.is_empty())
        .unwrap_or(bucket);
    let mut root = FolderNode::new(root_name);

    for object in objects {
        if object.key == folder_prefix || !object.key.starts_with(prefix) {
            continue;
        }
        let Some(relative) = object.key.strip_prefix(folder_prefix) else {
            continue;
        };

        let mut components: Vec<&str> = relative.split('/').collect();
        let file_name = components.pop().unwrap_or_default();

        let mut folder = &mut root;
        for component in components {
            folder = folder
                .folders
                .entry(component.to_string())
                .or_insert_with(|| FolderNode::new(component));
        }

        if !file_name.is_empty() {
            folder.files.push(FileNode {
                name: file_name.to_string(),
                size: object.size,
                last_modified: format_last_modified(object),
            });
        }
    }

    sort_files(&mut root);
    root
}

fn sort_files(folder: &mut FolderNode) {
    folder.files.sort_by(|a, b| a.name.cmp(&b.name));
    for child in folder.folders.values_mut() {
        sort_files(child);
    }
}

fn format_last_modified(object: &ObjectDescriptor) -> String {
    match object.last_modified.to_chrono_utc() {
        Ok(last_modified) => last_modified.format("%Y-%m-%d %H:%M:%S").to_string(),
        Err(_) => object.last_modified.secs().to_string(),
    }
}

/// Renders the tree with folders before files. Folders deeper than `max_depth` are
/// collapsed into a single `...` line.
pub fn render_key_tree(root: &FolderNode, max_depth: Option<usize>) -> Vec<String> {
    let mut lines = vec![];
    render_folder(root, 0, max_depth, &mut lines);
    lines
}

fn render_folder(
    folder: &FolderNode,
    level: usize,
    max_depth: Option<usize>,
    lines: &mut Vec<String>,
) {
    let indent = INDENT.repeat(level);
    lines.push(format!("{indent}[Folder] {}", folder.name));

    if let Some(max_depth) = max_depth {
        if max_depth <= level {
            if 0 < folder.entry_count() {
                lines.push(format!(
                    "{indent}{INDENT}... ({} entries)",
                    folder.entry_count()
                ));
            }
            return;
        }
    }

    for child in folder.folders.values() {
        render_folder(child, level + 1, max_depth, lines);
    }

    for file in &folder.files {
        lines.push(format!(
            "{indent}{INDENT}[File] {} ({} bytes) - Last Modified: {}",
            file.name, file.size, file.last_modified
        ));
    }
}
