//! 层级键寻址的多维数组存储.
//!
//! 存储是一个目录. 分组就是子目录; 键 `a/b/c` 上的数组节点是文件 `a/b/c.npz`,
//! 它是一个压缩的 npz 归档, 内含数组本身 (`data`) 和以 UTF-8 JSON
//! 编码的属性 (`attrs`, 存为 `u8` 向量).
//!
//! # 并发
//!
//! 写入总是先写到同目录下的隐藏临时文件, 然后通过 `rename` 原子地替换目标,
//! 因此任何时刻读者要么看到旧数组, 要么看到新数组, 键不会短暂消失.
//! 存储没有全局索引文件, 多个进程/线程同时写入互不相交的子树是安全的.

use std::fs::{self, File};
use std::io::{BufReader, Write};
use std::path::{Path, PathBuf};
use std::process;
use std::sync::atomic::{AtomicU64, Ordering};

use log::{debug, trace};
use ndarray::{Array, Array1, ArrayBase, Data, Dimension, Ix1, OwnedRepr};
use ndarray_npy::{NpzReader, NpzWriter, ReadableElement, WritableElement};
use serde_json::Value;

use crate::{Error, Result};

mod key;

use key::{Key, ARRAY_EXT, GROUP_ATTRS_FILE};

pub use key::join_key;

/// 节点属性. 键值对, 值为任意 JSON.
pub type Attrs = serde_json::Map<String, Value>;

/// npz 归档内数组条目名.
const DATA_ENTRY: &str = "data";

/// npz 归档内属性条目名.
const ATTRS_ENTRY: &str = "attrs";

/// 用于生成进程内唯一的临时文件名.
static TMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// 存储打开模式.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum OpenMode {
    /// 只读. 任何写操作都会返回 [`Error::ReadOnly`].
    Read,

    /// 读写. 存储目录必须已存在.
    ReadWrite,

    /// 读写. 存储目录不存在时创建.
    Create,
}

/// 存储句柄.
///
/// 句柄只包含根路径和打开模式, 可以廉价地克隆并在线程间共享.
#[derive(Clone, Debug)]
pub struct Store {
    root: PathBuf,
    mode: OpenMode,
}

impl Store {
    /// 以 `mode` 模式打开位于 `path` 的存储.
    ///
    /// # 返回值
    ///
    /// - [`OpenMode::Read`] 和 [`OpenMode::ReadWrite`] 下目录不存在时返回
    ///   `Err(Error::NotFound)`;
    /// - [`OpenMode::Create`] 下会创建目录 (包括所有父目录).
    pub fn open<P: AsRef<Path>>(path: P, mode: OpenMode) -> Result<Self> {
        let root = path.as_ref().to_owned();
        match mode {
            OpenMode::Create => fs::create_dir_all(&root)?,
            OpenMode::Read | OpenMode::ReadWrite if !root.is_dir() => {
                return Err(Error::NotFound(root.display().to_string()));
            }
            _ => {}
        }
        debug!("打开存储 {} ({mode:?})", root.display());
        Ok(Self { root, mode })
    }

    /// 存储根目录.
    #[inline]
    pub fn path(&self) -> &Path {
        &self.root
    }

    /// 打开模式.
    #[inline]
    pub fn mode(&self) -> OpenMode {
        self.mode
    }

    /// 键 `key` 上是否存在节点 (分组或数组). 非法键视为不存在.
    pub fn exists(&self, key: &str) -> bool {
        let Ok(k) = Key::parse(key) else {
            return false;
        };
        k.group_path(&self.root).is_dir() || self.array_file(&k).is_some_and(|p| p.is_file())
    }

    /// 键 `key` 上是否存在数组节点.
    pub fn is_array(&self, key: &str) -> bool {
        Key::parse(key)
            .ok()
            .and_then(|k| self.array_file(&k))
            .is_some_and(|p| p.is_file())
    }

    /// 读取键 `key` 上的数组. 元素类型与维度必须与写入时一致.
    pub fn read<A, D>(&self, key: &str) -> Result<Array<A, D>>
    where
        A: ReadableElement,
        D: Dimension,
    {
        let mut npz = self.open_archive(key)?;
        Ok(npz.by_name::<OwnedRepr<A>, D>(DATA_ENTRY)?)
    }

    /// 读取键 `key` 上数组的属性.
    pub fn attrs(&self, key: &str) -> Result<Attrs> {
        let mut npz = self.open_archive(key)?;
        let raw = npz.by_name::<OwnedRepr<u8>, Ix1>(ATTRS_ENTRY)?;
        Ok(serde_json::from_slice(&raw.into_raw_vec())?)
    }

    /// 将 `array` 及属性 `attrs` 写到键 `key` 上 (写入或替换).
    ///
    /// 不会与旧属性合并. 若 `key` 上已有同名分组, 返回 [`Error::InvalidArgument`].
    pub fn write<S, D>(&self, key: &str, array: &ArrayBase<S, D>, attrs: &Attrs) -> Result<()>
    where
        S: Data,
        S::Elem: WritableElement,
        D: Dimension,
    {
        self.check_writable()?;
        let k = Key::parse(key)?;
        let target = self
            .array_file(&k)
            .ok_or_else(|| Error::InvalidArgument("不能向根分组写入数组".to_string()))?;
        if k.group_path(&self.root).is_dir() {
            return Err(Error::InvalidArgument(format!("键 `{key}` 是一个分组")));
        }
        let dir = k.parent_path(&self.root);
        fs::create_dir_all(&dir)?;

        let tmp = tmp_path(&dir, k.leaf().unwrap_or_default());
        let written = (|| -> Result<()> {
            let mut npz = NpzWriter::new_compressed(File::create(&tmp)?);
            npz.add_array(DATA_ENTRY, array)?;
            let meta = Array1::from(serde_json::to_vec(attrs)?);
            npz.add_array(ATTRS_ENTRY, &meta)?;
            npz.finish()?.sync_all()?;
            fs::rename(&tmp, &target)?;
            Ok(())
        })();
        if written.is_err() {
            // 尽力清理, 失败也不影响返回原错误.
            let _ = fs::remove_file(&tmp);
        }
        trace!("写入 {key}: shape {:?}", array.shape());
        written
    }

    /// 删除键 `key` 上的节点 (数组或整个分组子树).
    ///
    /// 返回是否确实删除了内容. 不存在的键不是错误.
    pub fn delete(&self, key: &str) -> Result<bool> {
        self.check_writable()?;
        let k = Key::parse(key)?;
        if k.is_root() {
            return Err(Error::InvalidArgument("不能删除根分组".to_string()));
        }
        let mut removed = false;
        if let Some(p) = self.array_file(&k).filter(|p| p.is_file()) {
            fs::remove_file(p)?;
            removed = true;
        }
        let dir = k.group_path(&self.root);
        if dir.is_dir() {
            fs::remove_dir_all(dir)?;
            removed = true;
        }
        if removed {
            debug!("删除 {key}");
        }
        Ok(removed)
    }

    /// 按字典序列出分组 `key` 的所有直接子节点名. `""` 代表根分组.
    pub fn list_children(&self, key: &str) -> Result<Vec<String>> {
        let k = Key::parse(key)?;
        let dir = k.group_path(&self.root);
        if !dir.is_dir() {
            return Err(Error::NotFound(k.raw().to_string()));
        }
        let mut ans = Vec::with_capacity(8);
        for entry in fs::read_dir(&dir)? {
            let entry = entry?;
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            if name.starts_with('.') {
                continue;
            }
            let ty = entry.file_type()?;
            if ty.is_dir() {
                ans.push(name.to_string());
            } else if let Some(stem) = name.strip_suffix(&format!(".{ARRAY_EXT}")) {
                ans.push(stem.to_string());
            }
        }
        ans.sort_unstable();
        ans.dedup();
        Ok(ans)
    }

    /// 覆写分组 `key` 的属性. 分组不存在时创建.
    pub fn write_group_attrs(&self, key: &str, attrs: &Attrs) -> Result<()> {
        self.check_writable()?;
        let k = Key::parse(key)?;
        let dir = k.group_path(&self.root);
        fs::create_dir_all(&dir)?;
        let tmp = tmp_path(&dir, "attrs");
        let mut f = File::create(&tmp)?;
        f.write_all(&serde_json::to_vec_pretty(attrs)?)?;
        f.sync_all()?;
        fs::rename(&tmp, dir.join(GROUP_ATTRS_FILE))?;
        Ok(())
    }

    /// 读取分组 `key` 的属性. 分组存在但从未写入属性时返回空表.
    pub fn group_attrs(&self, key: &str) -> Result<Attrs> {
        let k = Key::parse(key)?;
        let dir = k.group_path(&self.root);
        if !dir.is_dir() {
            return Err(Error::NotFound(key.to_string()));
        }
        match File::open(dir.join(GROUP_ATTRS_FILE)) {
            Ok(f) => Ok(serde_json::from_reader(BufReader::new(f))?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Attrs::new()),
            Err(e) => Err(e.into()),
        }
    }

    /// 打开键 `key` 上的 npz 归档. 不存在时返回 [`Error::NotFound`].
    fn open_archive(&self, key: &str) -> Result<NpzReader<File>> {
        let k = Key::parse(key)?;
        let path = self
            .array_file(&k)
            .ok_or_else(|| Error::NotFound(key.to_string()))?;
        let file = match File::open(&path) {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(Error::NotFound(key.to_string()));
            }
            Err(e) => return Err(e.into()),
        };
        Ok(NpzReader::new(file)?)
    }

    #[inline]
    fn array_file(&self, k: &Key) -> Option<PathBuf> {
        k.array_path(&self.root)
    }

    #[inline]
    fn check_writable(&self) -> Result<()> {
        match self.mode {
            OpenMode::Read => Err(Error::ReadOnly),
            OpenMode::ReadWrite | OpenMode::Create => Ok(()),
        }
    }
}

/// 在 `dir` 下生成一个隐藏的, 进程间与线程间均唯一的临时文件路径.
fn tmp_path(dir: &Path, leaf: &str) -> PathBuf {
    let n = TMP_COUNTER.fetch_add(1, Ordering::Relaxed);
    dir.join(format!(".{leaf}.{}.{n}.tmp", process::id()))
}

/// 构造属性表的便捷宏: `attrs! { "author" => "x", "n" => 3 }`.
#[macro_export]
macro_rules! attrs {
    ($($k: expr => $v: expr),* $(,)?) => {{
        #[allow(unused_mut)]
        let mut m = $crate::store::Attrs::new();
        $(m.insert(($k).to_string(), ::serde_json::json!($v));)*
        m
    }};
}

#[cfg(test)]
mod tests {
    use super::{OpenMode, Store};
    use crate::Error;
    use ndarray::{array, Array2, Array3, Ix2, Ix3};

    fn tmp_store() -> (tempfile::TempDir, Store) {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path().join("s"), OpenMode::Create).unwrap();
        (dir, store)
    }

    #[test]
    fn test_open_missing() {
        let dir = tempfile::tempdir().unwrap();
        let err = Store::open(dir.path().join("nope"), OpenMode::ReadWrite).unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_write_read_with_attrs() {
        let (_d, store) = tmp_store();
        let a: Array2<bool> = array![[true, false], [false, true]];
        store
            .write("m/g/mask", &a, &attrs! {"author" => "me", "n" => 2})
            .unwrap();

        assert!(store.exists("m"));
        assert!(store.exists("m/g"));
        assert!(store.is_array("m/g/mask"));
        assert!(!store.is_array("m/g"));
        assert_eq!(store.read::<bool, Ix2>("m/g/mask").unwrap(), a);

        let at = store.attrs("m/g/mask").unwrap();
        assert_eq!(at["author"], "me");
        assert_eq!(at["n"], 2);
    }

    #[test]
    fn test_overwrite_replaces_without_merge() {
        let (_d, store) = tmp_store();
        let a = Array3::<u16>::from_elem((2, 3, 3), 7);
        store.write("x", &a, &attrs! {"old" => true}).unwrap();
        let b = Array3::<u16>::from_elem((4, 1, 3), 9);
        store.write("x", &b, &attrs! {"new" => true}).unwrap();

        assert_eq!(store.read::<u16, Ix3>("x").unwrap(), b);
        let at = store.attrs("x").unwrap();
        assert!(at.get("old").is_none());
        assert_eq!(at["new"], true);
        // 临时文件已被重命名, 不会遗留.
        assert_eq!(store.list_children("").unwrap(), vec!["x".to_string()]);
    }

    #[test]
    fn test_not_found_and_delete() {
        let (_d, store) = tmp_store();
        assert!(store.read::<u8, Ix2>("a/b").unwrap_err().is_not_found());
        assert!(!store.delete("a/b").unwrap());

        store.write("a/b", &Array2::<u8>::zeros((1, 1)), &attrs! {}).unwrap();
        assert!(store.delete("a/b").unwrap());
        assert!(!store.exists("a/b"));
        assert!(store.exists("a"));
        assert!(store.delete("a").unwrap());
        assert!(!store.exists("a"));
    }

    #[test]
    fn test_read_only() {
        let (_d, store) = tmp_store();
        store.write("k", &Array2::<u8>::zeros((1, 1)), &attrs! {}).unwrap();
        let ro = Store::open(store.path(), OpenMode::Read).unwrap();
        assert!(matches!(
            ro.write("k", &Array2::<u8>::zeros((1, 1)), &attrs! {}),
            Err(Error::ReadOnly)
        ));
        assert!(matches!(ro.delete("k"), Err(Error::ReadOnly)));
        assert!(ro.read::<u8, Ix2>("k").is_ok());
    }

    #[test]
    fn test_list_children_sorted() {
        let (_d, store) = tmp_store();
        for k in ["g/c", "g/a", "g/b/x"] {
            store.write(k, &Array2::<u8>::zeros((1, 1)), &attrs! {}).unwrap();
        }
        store.write_group_attrs("g", &attrs! {"name" => "g"}).unwrap();
        assert_eq!(store.list_children("g").unwrap(), vec!["a", "b", "c"]);
        assert_eq!(store.group_attrs("g").unwrap()["name"], "g");
        assert!(store.group_attrs("g/b").unwrap().is_empty());
        assert!(store.list_children("nope").unwrap_err().is_not_found());
    }

    #[test]
    fn test_array_group_conflict() {
        let (_d, store) = tmp_store();
        store.write("g/a", &Array2::<u8>::zeros((1, 1)), &attrs! {}).unwrap();
        let err = store
            .write("g", &Array2::<u8>::zeros((1, 1)), &attrs! {})
            .unwrap_err();
        assert!(err.is_invalid_argument());
    }

    #[test]
    fn test_concurrent_disjoint_subtrees() {
        let (_d, store) = tmp_store();
        std::thread::scope(|s| {
            for i in 0..8 {
                let store = &store;
                s.spawn(move || {
                    for j in 0..4 {
                        let key = format!("mix/roi_{i}/seg/m{j}");
                        let a = Array2::<u32>::from_elem((3, 3), (i * 10 + j) as u32);
                        store.write(&key, &a, &attrs! {"i" => i}).unwrap();
                    }
                });
            }
        });
        assert_eq!(store.list_children("mix").unwrap().len(), 8);
        for i in 0..8 {
            for j in 0..4 {
                let a = store.read::<u32, Ix2>(&format!("mix/roi_{i}/seg/m{j}")).unwrap();
                assert!(a.iter().all(|&v| v == (i * 10 + j) as u32));
            }
        }
    }
}
