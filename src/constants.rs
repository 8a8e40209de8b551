//! # Constants
//!
//! Shared constants used throughout the controller.
//!
//! These values represent reasonable defaults and can be overridden via
//! configuration or environment variables where applicable.

/// Field manager used for server-side apply and status patches
pub const FIELD_MANAGER: &str = "octavia-controller";

/// Finalizer marker that gates deletion until external resources are cleaned up
pub const FINALIZER: &str = "openstack.org/octavia";

/// Label carrying the owning Octavia name on every sub-resource
pub const OWNER_LABEL: &str = "octavia.openstack.org/owner";

/// Annotation on the db-sync job carrying the database stage idempotency key
pub const DB_SYNC_HASH_ANNOTATION: &str = "octavia.openstack.org/db-sync-hash";

/// Key of the server CA passphrase in `<name>-ca-passphrase`
pub const CA_PASSPHRASE_KEY: &str = "server-ca-passphrase";

/// Default HTTP server port for metrics and health probes
pub const DEFAULT_METRICS_PORT: u16 = 5000;

/// Default HTTP server startup timeout (how long to wait for server to be ready)
pub const DEFAULT_SERVER_STARTUP_TIMEOUT_SECS: u64 = 10;

/// Default HTTP server readiness poll interval
pub const DEFAULT_SERVER_POLL_INTERVAL_MS: u64 = 50;

/// Default timeout for identity and quota API calls (seconds)
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 10;

/// Default exponential backoff starting value (seconds)
pub const DEFAULT_BACKOFF_MIN_SECS: u64 = 2;

/// Default exponential backoff maximum value (seconds)
pub const DEFAULT_BACKOFF_MAX_SECS: u64 = 300;

/// Default requeue interval once every stage is complete (seconds)
pub const DEFAULT_RESYNC_INTERVAL_SECS: u64 = 600;

/// Default delay before restarting watch stream after it ends or fails (seconds)
pub const DEFAULT_WATCH_RESTART_DELAY_SECS: u64 = 5;

/// Default maximum number of objects reconciled in parallel
pub const DEFAULT_MAX_CONCURRENT_RECONCILIATIONS: u16 = 10;

/// Default identity endpoint (Keystone)
pub const DEFAULT_KEYSTONE_URL: &str = "http://keystone-public.openstack.svc:5000/identity";

/// Default compute endpoint (Nova)
pub const DEFAULT_NOVA_URL: &str = "http://nova-public.openstack.svc:8774/compute";

/// Default network endpoint (Neutron)
pub const DEFAULT_NEUTRON_URL: &str = "http://neutron-public.openstack.svc:9696/networking";

/// Default image for the database migration job
pub const DEFAULT_DB_SYNC_IMAGE: &str = "quay.io/podified-antelope-centos9/openstack-octavia-api:current-podified";

/// Logical name of the primary database
pub const DATABASE_NAME: &str = "octavia";

/// Logical name of the persistence (task flow jobboard) database
pub const PERSISTENCE_DATABASE_NAME: &str = "octavia_persistence";

/// Name of the MariaDBDatabase object for the primary database
pub const DATABASE_CR_NAME: &str = "octavia";

/// Name of the MariaDBDatabase object for the persistence database
pub const PERSISTENCE_DATABASE_CR_NAME: &str = "octavia-persistence";

/// Key holding the account password in a database account secret
pub const DATABASE_PASSWORD_KEY: &str = "DatabasePassword";

/// Key holding the AMQP URL in a transport secret
pub const TRANSPORT_URL_KEY: &str = "transport_url";
