//! Prometheus 指标
//!
//! 每个 `AppMetrics` 持有独立的 Registry，便于测试中并行创建多个实例。

use prometheus::{
    CounterVec, Encoder, Gauge, GaugeVec, HistogramOpts, HistogramVec, Opts, Registry, TextEncoder,
};

/// 应用指标
#[derive(Clone)]
pub struct AppMetrics {
    registry: Registry,
    http_requests_total: CounterVec,
    http_request_duration: HistogramVec,
    errors_total: CounterVec,
    papers_ingested_total: CounterVec,
    jobs_total: CounterVec,
    job_duration: HistogramVec,
    jobs_in_progress: Gauge,
    ai_requests_total: CounterVec,
    ai_request_duration: HistogramVec,
    queue_depth: GaugeVec,
}

impl AppMetrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new_custom(Some("scholarly".into()), None)?;

        let http_requests_total = CounterVec::new(
            Opts::new("http_requests_total", "Total HTTP requests"),
            &["method", "route", "status"],
        )?;
        let http_request_duration = HistogramVec::new(
            HistogramOpts::new(
                "http_request_duration_seconds",
                "HTTP request duration in seconds",
            )
            .buckets(vec![0.005, 0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]),
            &["method", "route"],
        )?;
        let errors_total = CounterVec::new(
            Opts::new("errors_total", "Total errors by code"),
            &["code"],
        )?;
        let papers_ingested_total = CounterVec::new(
            Opts::new("papers_ingested_total", "Papers added to the catalogue"),
            &["source"],
        )?;
        let jobs_total = CounterVec::new(
            Opts::new("jobs_total", "Background job events by task and outcome"),
            &["task", "outcome"],
        )?;
        let job_duration = HistogramVec::new(
            HistogramOpts::new("job_duration_seconds", "Background job duration in seconds")
                .buckets(vec![0.1, 0.5, 1.0, 5.0, 10.0, 30.0, 60.0, 300.0, 600.0]),
            &["task"],
        )?;
        let jobs_in_progress = Gauge::new(
            "jobs_in_progress",
            "Number of jobs currently being processed",
        )?;
        let ai_requests_total = CounterVec::new(
            Opts::new("ai_requests_total", "AI provider requests"),
            &["operation", "status"],
        )?;
        let ai_request_duration = HistogramVec::new(
            HistogramOpts::new(
                "ai_request_duration_seconds",
                "AI provider request latency in seconds",
            )
            .buckets(vec![0.5, 1.0, 2.0, 5.0, 10.0, 30.0, 60.0, 120.0]),
            &["operation"],
        )?;
        let queue_depth = GaugeVec::new(
            Opts::new("queue_depth", "Jobs waiting in each queue"),
            &["queue"],
        )?;

        registry.register(Box::new(http_requests_total.clone()))?;
        registry.register(Box::new(http_request_duration.clone()))?;
        registry.register(Box::new(errors_total.clone()))?;
        registry.register(Box::new(papers_ingested_total.clone()))?;
        registry.register(Box::new(jobs_total.clone()))?;
        registry.register(Box::new(job_duration.clone()))?;
        registry.register(Box::new(jobs_in_progress.clone()))?;
        registry.register(Box::new(ai_requests_total.clone()))?;
        registry.register(Box::new(ai_request_duration.clone()))?;
        registry.register(Box::new(queue_depth.clone()))?;

        Ok(Self {
            registry,
            http_requests_total,
            http_request_duration,
            errors_total,
            papers_ingested_total,
            jobs_total,
            job_duration,
            jobs_in_progress,
            ai_requests_total,
            ai_request_duration,
            queue_depth,
        })
    }

    /// 记录 HTTP 请求
    pub fn record_http_request(&self, method: &str, route: &str, status: u16, duration_secs: f64) {
        self.http_requests_total
            .with_label_values(&[method, route, &status.to_string()])
            .inc();
        self.http_request_duration
            .with_label_values(&[method, route])
            .observe(duration_secs);
    }

    /// 记录错误
    pub fn record_error(&self, code: &str) {
        self.errors_total.with_label_values(&[code]).inc();
    }

    pub fn record_paper_ingested(&self, source: &str) {
        self.papers_ingested_total.with_label_values(&[source]).inc();
    }

    /// 记录作业事件：enqueued / succeeded / failed / retried / dead_lettered / timeout
    pub fn record_job(&self, task: &str, outcome: &str) {
        self.jobs_total.with_label_values(&[task, outcome]).inc();
    }

    pub fn observe_job_duration(&self, task: &str, duration_secs: f64) {
        self.job_duration
            .with_label_values(&[task])
            .observe(duration_secs);
    }

    pub fn job_started(&self) {
        self.jobs_in_progress.inc();
    }

    pub fn job_finished(&self) {
        self.jobs_in_progress.dec();
    }

    /// 记录 AI 调用
    pub fn record_ai_request(&self, operation: &str, success: bool, duration_secs: f64) {
        let status = if success { "success" } else { "error" };
        self.ai_requests_total
            .with_label_values(&[operation, status])
            .inc();
        self.ai_request_duration
            .with_label_values(&[operation])
            .observe(duration_secs);
    }

    pub fn set_queue_depth(&self, queue: &str, depth: usize) {
        self.queue_depth
            .with_label_values(&[queue])
            .set(depth as f64);
    }

    /// 生成 Prometheus 文本格式
    pub fn gather(&self) -> String {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        if let Err(e) = encoder.encode(&self.registry.gather(), &mut buffer) {
            return format!("# Error encoding metrics: {}\n", e);
        }
        String::from_utf8(buffer)
            .unwrap_or_else(|e| format!("# Error converting metrics to UTF-8: {}\n", e))
    }
}

impl std::fmt::Debug for AppMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppMetrics").finish_non_exhaustive()
    }
}
