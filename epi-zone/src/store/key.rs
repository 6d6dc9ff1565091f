//! 层级键的解析与到文件系统路径的映射.

use std::path::{Path, PathBuf};

use crate::{Error, Result};

/// 数组节点文件的扩展名.
pub(super) const ARRAY_EXT: &str = "npz";

/// 分组属性文件名. 以 `.` 开头, 因此不会被当作子节点列出.
pub(super) const GROUP_ATTRS_FILE: &str = ".attrs.json";

/// 解析后的键. 空键代表根分组.
#[derive(Debug, Clone)]
pub(super) struct Key<'a> {
    raw: &'a str,
    segments: Vec<&'a str>,
}

impl<'a> Key<'a> {
    /// 按 `/` 拆分并检查每一段. 首尾的 `/` 会被忽略.
    pub fn parse(raw: &'a str) -> Result<Self> {
        let trimmed = raw.trim_matches('/');
        if trimmed.is_empty() {
            return Ok(Self {
                raw,
                segments: vec![],
            });
        }
        let segments: Vec<&str> = trimmed.split('/').collect();
        for seg in segments.iter() {
            if !is_valid_segment(seg) {
                return Err(Error::InvalidArgument(format!("非法键 `{raw}`: 段 `{seg}`")));
            }
        }
        Ok(Self { raw, segments })
    }

    /// 是否是根分组.
    #[inline]
    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    /// 原始键字符串.
    #[inline]
    pub fn raw(&self) -> &'a str {
        self.raw
    }

    /// 最后一段. 根分组返回 `None`.
    #[inline]
    pub fn leaf(&self) -> Option<&'a str> {
        self.segments.last().copied()
    }

    /// 分组目录路径.
    pub fn group_path(&self, root: &Path) -> PathBuf {
        let mut p = root.to_owned();
        p.extend(self.segments.iter());
        p
    }

    /// 父分组目录路径. 根分组返回 `root` 本身.
    pub fn parent_path(&self, root: &Path) -> PathBuf {
        let mut p = root.to_owned();
        if let Some((_, parents)) = self.segments.split_last() {
            p.extend(parents.iter());
        }
        p
    }

    /// 数组节点文件路径. 根分组返回 `None`.
    pub fn array_path(&self, root: &Path) -> Option<PathBuf> {
        let leaf = self.leaf()?;
        Some(self.parent_path(root).join(format!("{leaf}.{ARRAY_EXT}")))
    }
}

/// 段名不能为空, 不能以 `.` 开头 (保留给临时文件和属性文件),
/// 不能含有路径分隔符, 也不能以数组扩展名结尾.
fn is_valid_segment(seg: &str) -> bool {
    !seg.is_empty()
        && !seg.starts_with('.')
        && !seg.contains(['\\', '\0'])
        && !seg.ends_with(&format!(".{ARRAY_EXT}"))
}

/// 拼接多段为一个键.
pub fn join_key<I, S>(segments: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut ans = String::with_capacity(64);
    for seg in segments {
        if !ans.is_empty() {
            ans.push('/');
        }
        ans.push_str(seg.as_ref());
    }
    ans
}

#[cfg(test)]
mod tests {
    use super::{join_key, Key};
    use std::path::Path;

    #[test]
    fn test_parse_key() {
        let k = Key::parse("/mix_1/apical_in/r_in_1/").unwrap();
        assert_eq!(k.leaf(), Some("r_in_1"));
        assert!(!k.is_root());
        assert_eq!(
            k.array_path(Path::new("/s")).unwrap(),
            Path::new("/s/mix_1/apical_in/r_in_1.npz")
        );
        assert_eq!(k.group_path(Path::new("/s")), Path::new("/s/mix_1/apical_in/r_in_1"));

        assert!(Key::parse("").unwrap().is_root());
        assert!(Key::parse("/").unwrap().is_root());
    }

    #[test]
    fn test_invalid_key() {
        for bad in ["a//b", "a/../b", "a/.hidden", "a/b.npz", "a\\b"] {
            assert!(Key::parse(bad).unwrap_err().is_invalid_argument(), "{bad}");
        }
    }

    #[test]
    fn test_join_key() {
        assert_eq!(join_key(["a", "b", "c"]), "a/b/c");
        assert_eq!(join_key(Vec::<String>::new()), "");
    }
}
