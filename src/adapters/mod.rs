//! Adapters: concrete implementations of the hexagonal port traits.
//!
//! | Adapter     | Implements                   | Connects to                |
//! |-------------|------------------------------|----------------------------|
//! | `hardware`  | InputPort, IndicatorPort,    | GPIO buttons, LEDC, ADC1   |
//! |             | PowerSensePort               |                            |
//! | `wifi`      | LinkPort                     | ESP-IDF WiFi STA / setup AP|
//! | `udp`       | DatagramPort                 | BSD sockets (12345, 12346) |
//! | `http`      | HttpPort                     | esp-http-client            |
//! | `console`   | ConsolePort                  | UART / USB-CDC console     |
//! | `nvs`       | StoragePort                  | NVS / in-memory store      |
//! | `log_sink`  | EventSink                    | Serial log output          |
//! | `mdns`      | none                         | mDNS service advertisement |
//! | `web`       | none (bridge to handle_web)  | esp_http_server, port 80   |
//! | `board`     | all device ports (delegates) | the adapters above         |

pub mod board;
pub mod console;
pub mod device_id;
pub mod hardware;
pub mod http;
pub mod log_sink;
pub mod mdns;
pub mod nvs;
pub mod time;
pub mod udp;
pub mod web;
pub mod wifi;
