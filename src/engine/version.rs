use chrono::{DateTime, Utc};

/// 当前写出的流水线文件格式版本
pub const FILE_VERSION: &str = "0.2.0";

/// 保存时写入文件的版本信息
#[derive(Debug, Clone, PartialEq)]
pub struct Version {
    pub version: String,
    pub date: DateTime<Utc>,
}

impl Version {
    pub fn now() -> Self {
        Self {
            version: FILE_VERSION.to_string(),
            date: Utc::now(),
        }
    }

    pub fn date_stamp(&self) -> String {
        self.date.to_rfc3339()
    }
}

/// 文件版本的主版本号与当前一致时才能直接读取
pub fn is_compatible(version: &str) -> bool {
    let major = |v: &str| v.split('.').next().map(str::to_string);
    major(version).is_some() && major(version) == major(FILE_VERSION)
}
