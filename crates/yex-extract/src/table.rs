//! The object table: every entry the image has named so far.
//!
//! Headers arrive in allocation order, so a child's header always follows
//! its parent's. The table enforces that ordering as it builds destination
//! paths, and it rejects the tree-structure corruptions an image can carry:
//! reused object ids, names that escape the destination, parents that do not
//! exist or are not directories.
//!
//! Directories additionally thread an intrusive chain in insertion order.
//! Their timestamps cannot be restored as they are created (writing children
//! would dirty them again), so the chain is replayed once extraction is
//! done, newest directory first.

use std::collections::HashMap;
use yex_error::{ExtractError, Result};
use yex_ondisk::{ObjectHeader, ObjectType};
use yex_types::ObjectId;

/// One named entry of the image tree.
#[derive(Debug, Clone)]
pub struct Object {
    pub id: ObjectId,
    pub object_type: ObjectType,
    /// Destination-relative path; `.` for the root itself.
    pub path: String,
    pub atime: u32,
    pub mtime: u32,
    /// Previous directory in the deferred-timestamp chain; 0 terminates.
    prev_dir_id: u32,
}

pub struct ObjectTable {
    /// Root lives at slot 0 from construction.
    objects: Vec<Object>,
    index: HashMap<ObjectId, usize>,
    /// Head of the directory chain; 0 while no directory is chained.
    last_dir_id: u32,
}

impl ObjectTable {
    #[must_use]
    pub fn new() -> Self {
        let root = Object {
            id: ObjectId::ROOT,
            object_type: ObjectType::Directory,
            path: ".".to_owned(),
            atime: 0,
            mtime: 0,
            prev_dir_id: 0,
        };
        let mut index = HashMap::new();
        index.insert(ObjectId::ROOT, 0);
        Self {
            objects: vec![root],
            index,
            last_dir_id: 0,
        }
    }

    #[must_use]
    pub fn get(&self, id: ObjectId) -> Option<&Object> {
        self.index.get(&id).map(|idx| &self.objects[*idx])
    }

    /// Record the entry a header chunk describes and return it.
    ///
    /// A root header never creates anything: the root pre-exists, and its
    /// header only restores metadata. It must still describe a directory,
    /// and it joins the timestamp chain only if no directory beat it there.
    pub fn insert(&mut self, id: ObjectId, header: &ObjectHeader) -> Result<&Object> {
        if id == ObjectId::ROOT {
            if header.object_type != ObjectType::Directory {
                return Err(ExtractError::RootNotDirectory);
            }
            if self.last_dir_id == 0 {
                self.last_dir_id = ObjectId::ROOT.0;
            }
            let root = &mut self.objects[0];
            root.atime = header.atime;
            root.mtime = header.mtime;
            return Ok(&self.objects[0]);
        }

        if header.name.is_empty()
            || header.name.contains('/')
            || header.name == "."
            || header.name == ".."
        {
            return Err(ExtractError::InvalidObjectName {
                id,
                name: header.name.clone(),
            });
        }
        if self.index.contains_key(&id) {
            return Err(ExtractError::DuplicateObject { id });
        }

        let path = {
            let parent = self.get(header.parent_id).ok_or(ExtractError::MissingParent {
                id,
                parent: header.parent_id,
            })?;
            if parent.object_type != ObjectType::Directory {
                return Err(ExtractError::ParentNotDirectory {
                    id,
                    parent: header.parent_id,
                });
            }
            if parent.path == "." {
                header.name.clone()
            } else {
                format!("{}/{}", parent.path, header.name)
            }
        };

        let prev_dir_id = if header.object_type == ObjectType::Directory {
            std::mem::replace(&mut self.last_dir_id, id.0)
        } else {
            0
        };

        let slot = self.objects.len();
        self.objects.push(Object {
            id,
            object_type: header.object_type,
            path,
            atime: header.atime,
            mtime: header.mtime,
            prev_dir_id,
        });
        self.index.insert(id, slot);
        Ok(&self.objects[slot])
    }

    /// Directories whose timestamps were deferred, newest first.
    pub fn dir_chain(&self) -> impl Iterator<Item = &Object> + '_ {
        let mut next = self.last_dir_id;
        std::iter::from_fn(move || {
            if next == 0 {
                return None;
            }
            let obj = self.get(ObjectId(next))?;
            next = obj.prev_dir_id;
            Some(obj)
        })
    }
}

impl Default for ObjectTable {
    fn default() -> Self {
        Self::new()
    }
}
