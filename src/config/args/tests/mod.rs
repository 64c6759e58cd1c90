mod build_config;
