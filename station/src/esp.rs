use std::{
    ffi::CString,
    thread,
    time::{Duration, Instant},
};

use anyhow::{anyhow, Context};
use embedded_svc::wifi::{AuthMethod, ClientConfiguration, Configuration};
use esp_idf_svc::{
    eventloop::EspSystemEventLoop,
    hal::prelude::Peripherals,
    log::EspLogger,
    netif::IpEvent,
    nvs::{EspDefaultNvsPartition, EspNvs, NvsDefault},
    sntp::{EspSntp, SyncStatus},
    sys,
    tls::{self, EspTls, X509},
    wifi::{EspWifi, WifiEvent},
};
use log::{info, warn};

use pogoda_common::{
    config::StationConfig,
    link::{LinkAction, LinkEvent, LinkSupervisor},
    scan::Observation,
    session::{AttemptOutcome, ObservationSink, Session},
    transport::{ConnectError, Connector, Endpoint, TransferError, Transport},
};

const NVS_NAMESPACE: &str = "pogoda";
const NVS_CONFIG_KEY: &str = "station_json";
const NVS_EPOCH_KEY: &str = "last_epoch";

const WEATHER_TASK_STACK_SIZE: usize = 8192;
const WATCHDOG_TIMEOUT_SEC: u32 = 90;
const TIME_STORE_PERIOD_S: u64 = 86_400;
const MAIN_LOOP_TICK_S: u64 = 5;

pub fn run() -> anyhow::Result<()> {
    sys::link_patches();
    EspLogger::initialize_default();

    let nvs_partition = init_nvs()?;
    let sys_loop = EspSystemEventLoop::take()?;

    let mut config = load_station_config(&nvs_partition).unwrap_or_else(|err| {
        warn!("failed to load station config from NVS: {err:#}");
        StationConfig::default()
    });
    config.sanitize();

    if config.wifi.ssid == "CHANGE_ME" {
        warn!("wifi credentials not configured; association will not succeed");
    }
    if config.api.api_key == "CHANGE_ME" {
        warn!("weather API key not configured; requests will be rejected");
    }

    let link = LinkSupervisor::new(config.wifi.max_retries);

    let Peripherals { modem, .. } = Peripherals::take()?;
    let mut wifi = EspWifi::new(modem, sys_loop.clone(), Some(nvs_partition.clone()))?;
    wifi.set_configuration(&Configuration::Client(ClientConfiguration {
        ssid: config
            .wifi
            .ssid
            .as_str()
            .try_into()
            .map_err(|_| anyhow!("wifi ssid too long"))?,
        password: config
            .wifi
            .password
            .as_str()
            .try_into()
            .map_err(|_| anyhow!("wifi password too long"))?,
        auth_method: AuthMethod::WPA2Personal,
        ..Default::default()
    }))?;

    // Association is driven entirely by stack callbacks: they feed the
    // supervisor and reissue the connect when told to. The fetch task only
    // ever reads readiness. Subscriptions go in before start() so the
    // initial StaStarted is not missed.
    let wifi_link = link.clone();
    let _wifi_sub = sys_loop.subscribe::<WifiEvent, _>(move |event| {
        let event = match event {
            WifiEvent::StaStarted => Some(LinkEvent::StationStarted),
            WifiEvent::StaDisconnected(_) => Some(LinkEvent::Disconnected),
            _ => None,
        };
        if let Some(event) = event {
            apply_link_action(wifi_link.handle_event(event));
        }
    })?;

    let ip_link = link.clone();
    let _ip_sub = sys_loop.subscribe::<IpEvent, _>(move |event| {
        if matches!(event, IpEvent::DhcpIpAssigned(_)) {
            apply_link_action(ip_link.handle_event(LinkEvent::AddressAcquired));
        }
    })?;

    wifi.start()?;
    info!("wifi started, associating with `{}`", config.wifi.ssid);
    disable_wifi_power_save();

    let mut nvs = EspNvs::new(nvs_partition, NVS_NAMESPACE, true)?;
    if unsafe { sys::esp_reset_reason() } == sys::esp_reset_reason_t_ESP_RST_POWERON {
        restore_persisted_time(&mut nvs);
    }
    let sntp = EspSntp::new_default()?;

    init_watchdog(WATCHDOG_TIMEOUT_SEC)?;
    add_current_task_to_watchdog()?;

    let fetch_link = link.clone();
    let fetch_config = config.clone();
    thread::Builder::new()
        .name("weather-get".to_string())
        .stack_size(WEATHER_TASK_STACK_SIZE)
        .spawn(move || run_fetch_cycle(fetch_link, fetch_config))
        .context("failed to spawn weather fetch thread")?;

    // Keep the radio and the event subscriptions alive for the process
    // lifetime; the main task is reduced to the clock bookkeeping tick.
    let _wifi = wifi;
    let mut last_stored: Option<Instant> = None;

    loop {
        feed_watchdog();

        let due = last_stored.map_or(true, |at| at.elapsed().as_secs() >= TIME_STORE_PERIOD_S);
        if due && matches!(sntp.get_sync_status(), SyncStatus::Completed) {
            match store_current_epoch(&mut nvs) {
                Ok(epoch) => {
                    info!("stored synchronized clock in NVS: epoch {epoch}");
                    last_stored = Some(Instant::now());
                }
                Err(err) => warn!("failed to store clock in NVS: {err:#}"),
            }
        }

        thread::sleep(Duration::from_secs(MAIN_LOOP_TICK_S));
    }
}

/// The perpetual fetch cycle: one session attempt, then a fixed cooldown,
/// forever. Failures only ever cost the current attempt.
fn run_fetch_cycle(link: LinkSupervisor, config: StationConfig) {
    let cooldown = Duration::from_millis(config.cooldown_ms);
    let mut session = Session::new(&config);
    let mut connector = EspTlsConnector;
    let mut sink = ConsoleSink {
        location: config.location_label,
    };

    loop {
        match session.run_attempt(&link, &mut connector, &mut sink) {
            AttemptOutcome::Completed {
                chunks,
                observations,
            } => {
                info!("fetch finished: {chunks} chunk(s), {observations} observation(s)");
            }
            outcome => info!("fetch cycle ended early: {outcome:?}"),
        }
        thread::sleep(cooldown);
    }
}

struct ConsoleSink {
    location: String,
}

impl ObservationSink for ConsoleSink {
    fn publish(&mut self, observation: &Observation) {
        info!("{}", observation.report(&self.location));
    }
}

struct EspTlsConnector;

struct EspTlsChannel {
    tls: Option<EspTls>,
}

impl Connector for EspTlsConnector {
    type Channel = EspTlsChannel;

    fn open(&mut self, endpoint: &Endpoint) -> Result<EspTlsChannel, ConnectError> {
        let ca_cert =
            CString::new(endpoint.ca_pem).map_err(|_| ConnectError::HandshakeFailed)?;

        let mut tls = EspTls::new().map_err(|err| {
            warn!("esp-tls allocation failed: {err}");
            ConnectError::ConnectFailed
        })?;

        tls.connect(
            &endpoint.host,
            endpoint.port,
            &tls::Config {
                ca_cert: Some(X509::pem(ca_cert.as_c_str())),
                timeout_ms: endpoint.timeout_s.saturating_mul(1000),
                ..Default::default()
            },
        )
        .map_err(|err| classify_connect(err.code()))?;

        Ok(EspTlsChannel { tls: Some(tls) })
    }
}

impl Transport for EspTlsChannel {
    fn write(&mut self, buf: &[u8]) -> Result<usize, TransferError> {
        let Some(tls) = self.tls.as_mut() else {
            return Err(TransferError::Fatal(0));
        };
        tls.write(buf).map_err(|err| classify_io(err.0.code()))
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize, TransferError> {
        let Some(tls) = self.tls.as_mut() else {
            return Err(TransferError::Fatal(0));
        };
        tls.read(buf).map_err(|err| classify_io(err.0.code()))
    }

    fn close(&mut self) {
        // Dropping the handle destroys the TLS session and its socket.
        self.tls = None;
    }
}

fn classify_connect(code: i32) -> ConnectError {
    if code == sys::ESP_ERR_ESP_TLS_CANNOT_RESOLVE_HOSTNAME as i32 {
        ConnectError::ResolveFailed
    } else if code == sys::ESP_ERR_ESP_TLS_FAILED_CONNECT_TO_HOST as i32
        || code == sys::ESP_ERR_ESP_TLS_CONNECTION_TIMEOUT as i32
    {
        ConnectError::ConnectFailed
    } else {
        ConnectError::HandshakeFailed
    }
}

fn classify_io(code: i32) -> TransferError {
    if code == sys::ESP_TLS_ERR_SSL_WANT_READ {
        TransferError::WantRead
    } else if code == sys::ESP_TLS_ERR_SSL_WANT_WRITE {
        TransferError::WantWrite
    } else {
        TransferError::Fatal(code)
    }
}

fn apply_link_action(action: Option<LinkAction>) {
    if let Some(LinkAction::Connect) = action {
        let rc = unsafe { sys::esp_wifi_connect() };
        if rc != sys::ESP_OK {
            warn!("esp_wifi_connect failed: esp_err_t={rc}");
        }
    }
}

fn init_nvs() -> anyhow::Result<EspDefaultNvsPartition> {
    match EspDefaultNvsPartition::take() {
        Ok(partition) => Ok(partition),
        Err(err)
            if err.code() == sys::ESP_ERR_NVS_NO_FREE_PAGES as i32
                || err.code() == sys::ESP_ERR_NVS_NEW_VERSION_FOUND as i32 =>
        {
            warn!("NVS partition unusable ({err}); erasing and retrying");
            let rc = unsafe { sys::nvs_flash_erase() };
            if rc != sys::ESP_OK {
                return Err(anyhow!("nvs_flash_erase failed with code {rc}"));
            }
            Ok(EspDefaultNvsPartition::take()?)
        }
        Err(err) => Err(err.into()),
    }
}

fn load_station_config(partition: &EspDefaultNvsPartition) -> anyhow::Result<StationConfig> {
    let mut nvs = EspNvs::new(partition.clone(), NVS_NAMESPACE, true)?;
    let mut buffer = vec![0_u8; 2048];

    match nvs.get_str(NVS_CONFIG_KEY, &mut buffer)? {
        Some(value) => Ok(serde_json::from_str::<StationConfig>(value)?),
        None => Ok(StationConfig::default()),
    }
}

/// Power-on boots start with an unset clock; seed it from the last epoch a
/// previous run stored so log timestamps are at least monotonic with the
/// outside world until SNTP catches up.
fn restore_persisted_time(nvs: &mut EspNvs<NvsDefault>) {
    match nvs.get_i64(NVS_EPOCH_KEY) {
        Ok(Some(epoch)) if epoch > 0 => {
            let tv = sys::timeval {
                tv_sec: epoch as _,
                tv_usec: 0,
            };
            let rc = unsafe { sys::settimeofday(&tv, core::ptr::null()) };
            if rc == 0 {
                info!("restored clock from NVS: epoch {epoch}");
            } else {
                warn!("settimeofday failed with code {rc}");
            }
        }
        Ok(_) => info!("no persisted clock in NVS yet"),
        Err(err) => warn!("failed to read persisted clock: {err}"),
    }
}

fn store_current_epoch(nvs: &mut EspNvs<NvsDefault>) -> anyhow::Result<i64> {
    let epoch = chrono::Utc::now().timestamp();
    nvs.set_i64(NVS_EPOCH_KEY, epoch)?;
    Ok(epoch)
}

fn init_watchdog(timeout_sec: u32) -> anyhow::Result<()> {
    let config = sys::esp_task_wdt_config_t {
        timeout_ms: timeout_sec.saturating_mul(1000),
        idle_core_mask: 0,
        trigger_panic: true,
    };
    let rc = unsafe { sys::esp_task_wdt_init(&config) };
    if rc == sys::ESP_OK || rc == sys::ESP_ERR_INVALID_STATE {
        return Ok(());
    }
    Err(anyhow!("esp_task_wdt_init failed with code {}", rc))
}

fn add_current_task_to_watchdog() -> anyhow::Result<()> {
    let rc = unsafe { sys::esp_task_wdt_add(core::ptr::null_mut()) };
    if rc == sys::ESP_OK || rc == sys::ESP_ERR_INVALID_STATE {
        return Ok(());
    }
    Err(anyhow!("esp_task_wdt_add failed with code {}", rc))
}

fn feed_watchdog() {
    let _ = unsafe { sys::esp_task_wdt_reset() };
}

fn disable_wifi_power_save() {
    let rc = unsafe { sys::esp_wifi_set_ps(0) };
    if rc == sys::ESP_OK {
        info!("wifi power save disabled");
    } else {
        warn!("failed to disable wifi power save: esp_err_t={rc}");
    }
}
