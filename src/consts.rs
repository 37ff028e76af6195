use const_format::concatcp;

pub const DISPLAY_NAME: &str = "kube-serverless";

pub const NAMESPACE_ENV_VAR: &str = "KUBE_SERVERLESS_NAMESPACE";
pub const DEFAULT_NAMESPACE: &str = "kube-serverless";

pub const PORT_ENV_VAR: &str = "PORT";
pub const DEFAULT_PORT: u16 = 8080;

pub const METRICS_PORT_ENV_VAR: &str = "METRICS_PORT";
pub const DEFAULT_METRICS_PORT: u16 = 9090;

// Labels shared by every object of a function's resource quadruple.
pub const NAME_LABEL: &str = "app.kubernetes.io/name";
pub const MANAGED_BY_LABEL: &str = "app.kubernetes.io/managed-by";
pub const MANAGED_BY_VALUE: &str = DISPLAY_NAME;
pub const FUNCTION_LABEL: &str = "function";

pub const MANAGED_BY_SELECTOR: &str = concatcp!(MANAGED_BY_LABEL, "=", MANAGED_BY_VALUE);

pub const TRIGGERS_ANNOTATION: &str = concatcp!(DISPLAY_NAME, "/triggers");

pub const CODE_BUNDLE_SUFFIX: &str = "-code";
pub const CODE_BUNDLE_HANDLER_KEY: &str = "handler";
pub const CODE_BUNDLE_CODE_KEY: &str = "code";

pub const CODE_VOLUME_NAME: &str = "function-code";
pub const CODE_MOUNT_PATH: &str = "/function";

pub const CONTAINER_NAME: &str = "function";
pub const CONTAINER_PORT: i32 = 8080;
pub const SERVICE_PORT: i32 = 80;
pub const PORT_NAME: &str = "http";

pub const CPU_REQUEST: &str = "100m";
pub const MEMORY_REQUEST: &str = "128Mi";
pub const CPU_LIMIT: &str = "500m";
pub const MEMORY_LIMIT: &str = "512Mi";

pub const CPU_TARGET_UTILIZATION: i32 = 80;

pub const DEFAULT_MIN_REPLICAS: i32 = 0;
pub const DEFAULT_MAX_REPLICAS: i32 = 10;

/// Reserved workload environment variables, written in this order before user entries.
pub const FUNCTION_NAME_ENV_VAR: &str = "FUNCTION_NAME";
pub const FUNCTION_HANDLER_ENV_VAR: &str = "FUNCTION_HANDLER";
pub const RUNTIME_ENV_VAR: &str = "RUNTIME";

/// The state reported for every function whose workload exists.
pub const RUNNING_STATE: &str = "running";

pub const FUNCTION_CODE_PATH_ENV_VAR: &str = "FUNCTION_CODE_PATH";
pub const DEFAULT_FUNCTION_CODE_PATH: &str = concatcp!(CODE_MOUNT_PATH, "/", CODE_BUNDLE_CODE_KEY);
pub const DEFAULT_FUNCTION_HANDLER: &str = "index.handler";
pub const FUNCTION_TIMEOUT_ENV_VAR: &str = "FUNCTION_TIMEOUT";
pub const DEFAULT_FUNCTION_TIMEOUT_SECS: u64 = 30;

pub const DURATION_HEADER: &str = "x-function-duration";
pub const COLD_START_HEADER: &str = "x-cold-start";
