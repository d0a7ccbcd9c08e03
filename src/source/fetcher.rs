//! 远程规则拉取
//! 核心特性：
//! 1. 单源重试 + GitHub代理回退
//! 2. 每个规则源独立超时，超时视为该源失败
//! 3. 可并发拉取，但结果严格按配置顺序返回

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use futures::{stream, StreamExt};
use reqwest::Client;
use tracing::{debug, info, warn};

use super::model::RuleSource;
use crate::config::GlobalConfig;
use crate::error::{RsadResult, RsadrulesError};

/// 规则拉取能力
#[async_trait]
pub trait RuleFetcher: Send + Sync {
    /// 拉取单个规则源的完整文本内容
    async fn fetch(&self, source: &RuleSource) -> RsadResult<String>;
}

/// 基于 reqwest 的 HTTP 拉取器
pub struct HttpFetcher {
    client: Client,
    retries: usize,
    gh_proxy_url: String,
}

impl HttpFetcher {
    pub fn new(config: &GlobalConfig) -> RsadResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.http_timeout))
            .user_agent(concat!("Rsadrules/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            retries: config.retries,
            gh_proxy_url: config.gh_proxy_url.clone(),
        })
    }

    /// 通用异步重试逻辑（固定1秒间隔，保留最后一次错误）
    async fn simple_retry<F, Fut, T>(&self, mut func: F) -> RsadResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = RsadResult<T>>,
    {
        let mut last_err: Option<RsadrulesError> = None;

        for attempt in 0..=self.retries {
            match func().await {
                Ok(res) => return Ok(res),
                Err(e) => {
                    if attempt < self.retries {
                        warn!("请求失败：{}，1秒后重试（{}/{}）", e, attempt + 1, self.retries);
                        tokio::time::sleep(Duration::from_secs(1)).await;
                    }
                    last_err = Some(e);
                }
            }
        }

        Err(last_err.unwrap_or_else(|| RsadrulesError::InvalidInput("重试次数已耗尽".to_string())))
    }

    /// 拉取单个URL，非 2xx 状态码视为失败
    async fn fetch_url(&self, url: &str) -> RsadResult<String> {
        let response = self
            .client
            .get(url)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(RsadrulesError::InvalidInput(format!(
                "URL {} 返回状态码 {}",
                url,
                response.status()
            )));
        }

        let bytes = response.bytes().await?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}

#[async_trait]
impl RuleFetcher for HttpFetcher {
    async fn fetch(&self, source: &RuleSource) -> RsadResult<String> {
        debug!("开始拉取 [{}]，URL：{}", source.name, source.url);

        let raw_err = match self.simple_retry(|| self.fetch_url(&source.url)).await {
            Ok(content) => return Ok(content),
            Err(e) => e,
        };

        // 原始URL失败则尝试代理URL
        let Some(fallback_url) = source.proxy_url(&self.gh_proxy_url) else {
            return Err(RsadrulesError::SourceUnavailable {
                name: source.name.clone(),
                reason: raw_err.to_string(),
            });
        };
        warn!("拉取 [{}] 原始URL失败：{}，尝试代理URL：{}", source.name, raw_err, fallback_url);

        self.simple_retry(|| self.fetch_url(&fallback_url))
            .await
            .map_err(|proxy_err| RsadrulesError::SourceUnavailable {
                name: source.name.clone(),
                reason: format!("原始URL：{}；代理URL：{}", raw_err, proxy_err),
            })
    }
}

/// 拉取成功的规则源
#[derive(Debug, Clone)]
pub struct FetchedSource {
    pub source: RuleSource,
    pub content: String,
}

/// 拉取失败的规则源
#[derive(Debug, Clone)]
pub struct FetchFailure {
    pub source: RuleSource,
    pub reason: String,
}

/// 批量拉取结果（均按配置顺序排列）
#[derive(Debug, Clone, Default)]
pub struct FetchOutcome {
    pub fetched: Vec<FetchedSource>,
    pub failed: Vec<FetchFailure>,
}

/// 拉取全部规则源
/// 失败或超时的源被跳过并记录警告，不会向聚合结果混入残缺内容
pub async fn fetch_all(
    fetcher: &dyn RuleFetcher,
    sources: &[RuleSource],
    deadline: Duration,
    concurrency: usize,
) -> FetchOutcome {
    let tasks = sources.iter().cloned().map(|source| async move {
        let result = match tokio::time::timeout(deadline, fetcher.fetch(&source)).await {
            Ok(result) => result,
            Err(_) => Err(RsadrulesError::SourceUnavailable {
                name: source.name.clone(),
                reason: format!("超时（{:?}）", deadline),
            }),
        };
        (source, result)
    });

    // buffered 保证输出顺序与输入一致
    let results: Vec<(RuleSource, RsadResult<String>)> = stream::iter(tasks)
        .buffered(concurrency.max(1))
        .collect()
        .await;

    let mut outcome = FetchOutcome::default();
    for (source, result) in results {
        match result {
            Ok(content) => {
                info!("成功拉取 [{}]，共 {} 行", source.name, content.lines().count());
                outcome.fetched.push(FetchedSource { source, content });
            }
            Err(e) => {
                warn!("跳过规则源 [{}]：{}", source.name, e);
                outcome.failed.push(FetchFailure {
                    source,
                    reason: e.to_string(),
                });
            }
        }
    }

    outcome
}
