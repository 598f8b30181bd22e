mod test_containers;
mod test_server;
mod test_state_machine;
