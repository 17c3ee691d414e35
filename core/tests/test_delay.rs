#[cfg(test)]
mod tests {
    use std::thread;
    use std::time::{Duration, Instant};

    use ingest_core::executor::{DelayConfiguration, DelayKind, DelayUnit, Shutdown};

    fn ms(v: u64) -> Duration {
        Duration::from_millis(v)
    }

    #[test]
    fn backoff_doubles_until_the_cap() {
        let mut d = DelayConfiguration::backoff(100, 10_000, DelayUnit::Millis).delayer();
        let waits: Vec<Duration> = (0..4).map(|_| d.next_delay()).collect();
        assert_eq!(waits, [ms(100), ms(200), ms(400), ms(800)]);
    }

    #[test]
    fn backoff_is_capped() {
        let mut d = DelayConfiguration::backoff(100, 150, DelayUnit::Millis).delayer();
        let waits: Vec<Duration> = (0..4).map(|_| d.next_delay()).collect();
        assert_eq!(waits, [ms(100), ms(150), ms(150), ms(150)]);
    }

    #[test]
    fn backoff_never_overflows() {
        let mut d = DelayConfiguration::backoff(1, 30, DelayUnit::Seconds).delayer();
        for _ in 0..200 {
            assert!(d.next_delay() <= Duration::from_secs(30));
        }
    }

    #[test]
    fn linear_is_constant() {
        let mut d = DelayConfiguration::linear(250, DelayUnit::Millis).delayer();
        assert!((0..5).all(|_| d.next_delay() == ms(250)));
    }

    #[test]
    fn each_delayer_starts_fresh() {
        let config = DelayConfiguration::backoff(10, 1000, DelayUnit::Millis);
        let mut first = config.delayer();
        first.next_delay();
        first.next_delay();
        assert_eq!(config.delayer().next_delay(), ms(10));
    }

    #[test]
    fn config_parses_from_toml() {
        let config: DelayConfiguration =
            toml::from_str("kind = \"linear\"\nbase_delay = 2\nmax_delay = 2\nunit = \"seconds\"\n").unwrap();
        assert_eq!(config.kind, DelayKind::Linear);
        assert_eq!(config.delayer().next_delay(), Duration::from_secs(2));
    }

// ## Shutdown

    #[test]
    fn delay_completes_without_shutdown() {
        let mut d = DelayConfiguration::linear(20, DelayUnit::Millis).delayer();
        assert!(d.delay(&Shutdown::new()));
    }

    #[test]
    fn shutdown_interrupts_a_long_wait() {
        let shutdown = Shutdown::new();
        let trigger = shutdown.clone();
        let started = Instant::now();
        let waker = thread::spawn(move || {
            thread::sleep(ms(50));
            trigger.trigger();
        });

        let mut d = DelayConfiguration::linear(60, DelayUnit::Seconds).delayer();
        assert!(!d.delay(&shutdown));
        assert!(started.elapsed() < Duration::from_secs(10));
        assert!(shutdown.is_triggered());
        waker.join().unwrap();
    }

    #[test]
    fn already_triggered_shutdown_returns_immediately() {
        let shutdown = Shutdown::new();
        shutdown.trigger();
        let mut d = DelayConfiguration::linear(60, DelayUnit::Seconds).delayer();
        assert!(!d.delay(&shutdown));
    }
}
