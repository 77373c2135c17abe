mod activate;
mod bump;
mod call;
mod deactivate;
mod deliver_buffer;
mod deliver_label;
mod deliver_message;
#[cfg(test)]
#[path = "../../tests/worker/handlers_integration.rs"]
mod integration_tests;
mod port_info;
mod return_buffer;
mod setup_ports;
mod shutdown;
mod stats;
mod subscribe;
mod tick;
