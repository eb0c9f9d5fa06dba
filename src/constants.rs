/// 选择题模式下的默认掌握阈值（连续答对次数）
pub const DEFAULT_MC_MASTERY_THRESHOLD: u32 = 2;

/// 书写模式下的默认掌握阈值，比选择题更严格
pub const DEFAULT_WRITTEN_MASTERY_THRESHOLD: u32 = 3;

/// 答错后词条向后插入的位置偏移（越过的活跃词条数）
pub const DEFAULT_REINSERT_OFFSET: usize = 2;

/// 记录同步通道容量
pub const DEFAULT_SYNC_CHANNEL_CAPACITY: usize = 1024;

/// 记录同步失败后的最大重试次数
pub const DEFAULT_SYNC_MAX_RETRIES: u32 = 3;

/// 记录同步重试的基础退避（毫秒），按尝试次数线性增长
pub const DEFAULT_SYNC_RETRY_BACKOFF_MS: u64 = 200;

/// 会话空闲多久后被回收（分钟）
pub const DEFAULT_SESSION_IDLE_MINUTES: u64 = 30;

/// 学习集标题最大长度
pub const MAX_TITLE: usize = 255;

/// 学习集描述最大长度
pub const MAX_DESC: usize = 2000;

/// 单个词条 word / definition 最大长度
pub const MAX_TERM: usize = 1000;

/// 单个学习集最大词条数
pub const MAX_TERMS_PER_SET: usize = 2000;
