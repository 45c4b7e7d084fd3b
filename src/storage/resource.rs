use std::path::{Path, PathBuf};

/// 资源根（app bundle / 子 bundle / 数据目录……）
pub trait ResourceRoot: Send + Sync {
    fn locate(&self, name: &str) -> Option<PathBuf>;
    fn describe(&self) -> String;
}

/// 以目录为根
pub struct DirRoot {
    dir: PathBuf,
}

impl DirRoot {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

impl ResourceRoot for DirRoot {
    fn locate(&self, name: &str) -> Option<PathBuf> {
        let p = self.dir.join(name);
        p.is_file().then_some(p)
    }

    fn describe(&self) -> String {
        self.dir.display().to_string()
    }
}

/// 有序资源解析器：先到先得
#[derive(Default)]
pub struct ResourceResolver {
    roots: Vec<Box<dyn ResourceRoot>>,
}

impl ResourceResolver {
    pub fn new(roots: Vec<Box<dyn ResourceRoot>>) -> Self {
        Self { roots }
    }

    /// 目录列表 + `dirs::data_dir()/geobucket` 兜底
    pub fn from_dirs<P: AsRef<Path>>(dirs: &[P]) -> Self {
        let mut roots: Vec<Box<dyn ResourceRoot>> = dirs
            .iter()
            .map(|d| Box::new(DirRoot::new(d.as_ref())) as Box<dyn ResourceRoot>)
            .collect();
        if let Some(data) = dirs::data_dir() {
            roots.push(Box::new(DirRoot::new(data.join("geobucket"))));
        }
        Self { roots }
    }

    pub fn resolve(&self, name: &str) -> Option<PathBuf> {
        if name.is_empty() {
            return None;
        }
        let hit = self.roots.iter().find_map(|r| r.locate(name));
        if hit.is_none() {
            tracing::debug!(
                "resource {} not found in [{}]",
                name,
                self.roots
                    .iter()
                    .map(|r| r.describe())
                    .collect::<Vec<_>>()
                    .join(", ")
            );
        }
        hit
    }

    /// 依次尝试多个文件名
    pub fn resolve_first<'a>(&self, names: impl IntoIterator<Item = &'a str>) -> Option<PathBuf> {
        names.into_iter().find_map(|n| self.resolve(n))
    }

    pub fn len(&self) -> usize {
        self.roots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testkit::unique_tmp_dir;

    #[test]
    fn first_root_wins() {
        let a = unique_tmp_dir("res-a");
        let b = unique_tmp_dir("res-b");
        std::fs::write(a.join("idx.json"), b"a").unwrap();
        std::fs::write(b.join("idx.json"), b"b").unwrap();
        std::fs::write(b.join("only_b.bin"), b"b").unwrap();

        let r = ResourceResolver::new(vec![
            Box::new(DirRoot::new(&a)),
            Box::new(DirRoot::new(&b)),
        ]);
        assert_eq!(r.resolve("idx.json"), Some(a.join("idx.json")));
        assert_eq!(r.resolve("only_b.bin"), Some(b.join("only_b.bin")));
        assert_eq!(r.resolve("missing.bin"), None);
        assert_eq!(r.resolve(""), None);
    }

    #[test]
    fn directories_are_not_files() {
        let a = unique_tmp_dir("res-dir");
        std::fs::create_dir_all(a.join("sub")).unwrap();
        let r = ResourceResolver::new(vec![Box::new(DirRoot::new(&a))]);
        assert_eq!(r.resolve("sub"), None);
    }

    #[test]
    fn resolve_first_falls_through_names() {
        let a = unique_tmp_dir("res-first");
        std::fs::write(a.join("default.bin"), b"x").unwrap();
        let r = ResourceResolver::new(vec![Box::new(DirRoot::new(&a))]);
        assert_eq!(
            r.resolve_first(["declared.bin", "default.bin"]),
            Some(a.join("default.bin"))
        );
    }
}
