mod jog_pad_test;
mod mock_port;
mod stage_test;
