mod full_history_test;
mod latest_state_test;
mod pipeline_test;
mod store_test;
mod validation_test;
