use regex::Regex;
use std::fmt;
use std::sync::OnceLock;

fn multi_slash() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"/{2,}").expect("valid regex"))
}

/// 将连续的多个 `/` 合并为一个，并去掉末尾的一个 `/`
pub fn clean_path(path: &str) -> String {
    let cleaned = multi_slash().replace_all(path, "/");
    let cleaned: &str = &cleaned;
    cleaned.strip_suffix('/').unwrap_or(cleaned).to_string()
}

/// 排除前缀集合
///
/// 匹配是纯字符串前缀匹配（区分大小写，不按路径段）：
/// 前缀 `0:/sys/a` 同样会排除 `0:/sys/abc`。
#[derive(Debug, Clone, Default)]
pub struct Excludes {
    prefixes: Vec<String>,
}

impl Excludes {
    pub fn new() -> Self {
        Self::default()
    }

    /// 规范化后加入集合。空前缀会排除一切，由调用方负责拦截
    pub fn add(&mut self, prefix: &str) {
        self.prefixes.push(clean_path(prefix));
    }

    pub fn contains(&self, path: &str) -> bool {
        self.prefixes.iter().any(|p| path.starts_with(p.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.prefixes.is_empty()
    }
}

impl<S: AsRef<str>> FromIterator<S> for Excludes {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        let mut excludes = Excludes::new();
        for prefix in iter {
            excludes.add(prefix.as_ref());
        }
        excludes
    }
}

impl fmt::Display for Excludes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.prefixes.join(","))
    }
}
