mod classifier_tests;
mod config_tests;
mod provider_tests;
mod support;
