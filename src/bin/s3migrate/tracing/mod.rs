use std::env;

use rusty_fork::rusty_fork_test;
use tracing_subscriber::fmt::format::FmtSpan;

use s3migrate::config::TracingConfig;

const EVENT_FILTER_ENV_VAR: &str = "RUST_LOG";

fn build_event_filter(config: &TracingConfig) -> (String, bool) {
    let tracing_level = config.tracing_level;

    if config.aws_sdk_tracing {
        let filter = format!(
            "s3migrate={tracing_level},aws_smithy_runtime={tracing_level},aws_config={tracing_level},aws_sigv4={tracing_level}"
        );
        return (filter, true);
    }

    if let Ok(filter) = env::var(EVENT_FILTER_ENV_VAR) {
        return (filter, true);
    }

    (format!("s3migrate={tracing_level}"), false)
}

pub fn init_tracing(config: &TracingConfig) {
    let fmt_span = if config.span_events_tracing {
        FmtSpan::NEW | FmtSpan::CLOSE
    } else {
        FmtSpan::NONE
    };

    let (event_filter, show_target) = build_event_filter(config);

    let subscriber_builder = tracing_subscriber::fmt()
        .compact()
        .with_ansi(!config.disable_color_tracing)
        .with_span_events(fmt_span)
        .with_env_filter(event_filter)
        .with_target(show_target);

    if config.json_tracing {
        subscriber_builder.json().init();
    } else {
        subscriber_builder.init();
    }
}

#[cfg(test)]
fn tracing_config(json_tracing: bool, aws_sdk_tracing: bool, span_events_tracing: bool) -> TracingConfig {
    TracingConfig {
        tracing_level: log::Level::Info,
        json_tracing,
        aws_sdk_tracing,
        span_events_tracing,
        disable_color_tracing: false,
    }
}

rusty_fork_test! {
    #[test]
    fn init_json_tracing() {
        init_tracing(&tracing_config(true, false, false));
    }

    #[test]
    fn init_aws_sdk_tracing() {
        let config = tracing_config(false, true, false);
        let (filter, show_target) = build_event_filter(&config);
        assert!(filter.contains("aws_smithy_runtime=INFO"));
        assert!(show_target);

        init_tracing(&config);
    }

    #[test]
    fn init_normal_tracing() {
        // This code is used to test purpose only and run separated processes.
        unsafe { env::remove_var(EVENT_FILTER_ENV_VAR) };

        let config = tracing_config(false, false, false);
        assert_eq!(build_event_filter(&config), ("s3migrate=INFO".to_string(), false));

        init_tracing(&config);
    }

    #[test]
    fn init_span_events_tracing() {
        init_tracing(&tracing_config(false, false, true));
    }

    #[test]
    fn init_disable_color_tracing() {
        let mut config = tracing_config(false, false, false);
        config.disable_color_tracing = true;

        init_tracing(&config);
    }

    #[test]
    fn init_with_env() {
        // This code is used to test purpose only and run separated processes.
        unsafe { env::set_var(EVENT_FILTER_ENV_VAR, "trace") };

        let config = tracing_config(false, false, false);
        assert_eq!(build_event_filter(&config), ("trace".to_string(), true));

        init_tracing(&config);
    }
}
