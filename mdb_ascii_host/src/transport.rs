pub mod serial_link;
