//! Helper methods and trait implementations for IRC response codes.
//!
//! This module provides utility methods for Response enum including:
//! - Code conversion (from_code, code)
//! - Type checking (is_error, is_reply, etc.)
//! - Category classification
//! - Display/parsing traits

use super::Response;
use std::str::FromStr;

impl Response {
    /// Returns the numeric code as u16
    #[inline]
    pub fn code(&self) -> u16 {
        *self as u16
    }

    /// Creates a Response from a numeric code
    pub fn from_code(code: u16) -> Option<Response> {
        match code {
            1 => Some(Response::RPL_WELCOME),
            2 => Some(Response::RPL_YOURHOST),
            3 => Some(Response::RPL_CREATED),
            4 => Some(Response::RPL_MYINFO),
            5 => Some(Response::RPL_ISUPPORT),
            10 => Some(Response::RPL_BOUNCE),
            42 => Some(Response::RPL_YOURID),
            200 => Some(Response::RPL_TRACELINK),
            201 => Some(Response::RPL_TRACECONNECTING),
            202 => Some(Response::RPL_TRACEHANDSHAKE),
            203 => Some(Response::RPL_TRACEUNKNOWN),
            204 => Some(Response::RPL_TRACEOPERATOR),
            205 => Some(Response::RPL_TRACEUSER),
            206 => Some(Response::RPL_TRACESERVER),
            207 => Some(Response::RPL_TRACESERVICE),
            208 => Some(Response::RPL_TRACENEWTYPE),
            209 => Some(Response::RPL_TRACECLASS),
            210 => Some(Response::RPL_TRACERECONNECT),
            211 => Some(Response::RPL_STATSLINKINFO),
            212 => Some(Response::RPL_STATSCOMMANDS),
            216 => Some(Response::RPL_STATSKLINE),
            219 => Some(Response::RPL_ENDOFSTATS),
            220 => Some(Response::RPL_STATSDLINE),
            221 => Some(Response::RPL_UMODEIS),
            226 => Some(Response::RPL_STATSSHUN),
            234 => Some(Response::RPL_SERVLIST),
            235 => Some(Response::RPL_SERVLISTEND),
            242 => Some(Response::RPL_STATSUPTIME),
            243 => Some(Response::RPL_STATSOLINE),
            249 => Some(Response::RPL_STATSDEBUG),
            281 => Some(Response::RPL_ACCEPTLIST),
            282 => Some(Response::RPL_ENDOFACCEPT),
            251 => Some(Response::RPL_LUSERCLIENT),
            252 => Some(Response::RPL_LUSEROP),
            253 => Some(Response::RPL_LUSERUNKNOWN),
            254 => Some(Response::RPL_LUSERCHANNELS),
            255 => Some(Response::RPL_LUSERME),
            256 => Some(Response::RPL_ADMINME),
            257 => Some(Response::RPL_ADMINLOC1),
            258 => Some(Response::RPL_ADMINLOC2),
            259 => Some(Response::RPL_ADMINEMAIL),
            261 => Some(Response::RPL_TRACELOG),
            262 => Some(Response::RPL_TRACEEND),
            263 => Some(Response::RPL_TRYAGAIN),
            265 => Some(Response::RPL_LOCALUSERS),
            266 => Some(Response::RPL_GLOBALUSERS),
            271 => Some(Response::RPL_SILELIST),
            272 => Some(Response::RPL_ENDOFSILELIST),
            276 => Some(Response::RPL_WHOISCERTFP),
            300 => Some(Response::RPL_NONE),
            301 => Some(Response::RPL_AWAY),
            302 => Some(Response::RPL_USERHOST),
            303 => Some(Response::RPL_ISON),
            305 => Some(Response::RPL_UNAWAY),
            306 => Some(Response::RPL_NOWAWAY),
            311 => Some(Response::RPL_WHOISUSER),
            312 => Some(Response::RPL_WHOISSERVER),
            313 => Some(Response::RPL_WHOISOPERATOR),
            314 => Some(Response::RPL_WHOWASUSER),
            315 => Some(Response::RPL_ENDOFWHO),
            317 => Some(Response::RPL_WHOISIDLE),
            318 => Some(Response::RPL_ENDOFWHOIS),
            319 => Some(Response::RPL_WHOISCHANNELS),
            321 => Some(Response::RPL_LISTSTART),
            322 => Some(Response::RPL_LIST),
            323 => Some(Response::RPL_LISTEND),
            324 => Some(Response::RPL_CHANNELMODEIS),
            325 => Some(Response::RPL_UNIQOPIS),
            329 => Some(Response::RPL_CREATIONTIME),
            330 => Some(Response::RPL_WHOISACCOUNT),
            331 => Some(Response::RPL_NOTOPIC),
            332 => Some(Response::RPL_TOPIC),
            333 => Some(Response::RPL_TOPICWHOTIME),
            335 => Some(Response::RPL_WHOISBOT),
            338 => Some(Response::RPL_WHOISACTUALLY),
            340 => Some(Response::RPL_USERIP),
            341 => Some(Response::RPL_INVITING),
            342 => Some(Response::RPL_SUMMONING),
            346 => Some(Response::RPL_INVITELIST),
            347 => Some(Response::RPL_ENDOFINVITELIST),
            348 => Some(Response::RPL_EXCEPTLIST),
            349 => Some(Response::RPL_ENDOFEXCEPTLIST),
            351 => Some(Response::RPL_VERSION),
            352 => Some(Response::RPL_WHOREPLY),
            353 => Some(Response::RPL_NAMREPLY),
            354 => Some(Response::RPL_WHOSPCRPL),
            364 => Some(Response::RPL_LINKS),
            365 => Some(Response::RPL_ENDOFLINKS),
            366 => Some(Response::RPL_ENDOFNAMES),
            367 => Some(Response::RPL_BANLIST),
            368 => Some(Response::RPL_ENDOFBANLIST),
            369 => Some(Response::RPL_ENDOFWHOWAS),
            371 => Some(Response::RPL_INFO),
            372 => Some(Response::RPL_MOTD),
            374 => Some(Response::RPL_ENDOFINFO),
            375 => Some(Response::RPL_MOTDSTART),
            376 => Some(Response::RPL_ENDOFMOTD),
            378 => Some(Response::RPL_WHOISHOST),
            379 => Some(Response::RPL_WHOISMODES),
            381 => Some(Response::RPL_YOUREOPER),
            382 => Some(Response::RPL_REHASHING),
            383 => Some(Response::RPL_YOURESERVICE),
            391 => Some(Response::RPL_TIME),
            392 => Some(Response::RPL_USERSSTART),
            393 => Some(Response::RPL_USERS),
            394 => Some(Response::RPL_ENDOFUSERS),
            395 => Some(Response::RPL_NOUSERS),
            396 => Some(Response::RPL_HOSTHIDDEN),
            400 => Some(Response::ERR_UNKNOWNERROR),
            401 => Some(Response::ERR_NOSUCHNICK),
            402 => Some(Response::ERR_NOSUCHSERVER),
            403 => Some(Response::ERR_NOSUCHCHANNEL),
            404 => Some(Response::ERR_CANNOTSENDTOCHAN),
            405 => Some(Response::ERR_TOOMANYCHANNELS),
            406 => Some(Response::ERR_WASNOSUCHNICK),
            407 => Some(Response::ERR_TOOMANYTARGETS),
            408 => Some(Response::ERR_NOSUCHSERVICE),
            409 => Some(Response::ERR_NOORIGIN),
            410 => Some(Response::ERR_INVALIDCAPCMD),
            411 => Some(Response::ERR_NORECIPIENT),
            412 => Some(Response::ERR_NOTEXTTOSEND),
            413 => Some(Response::ERR_NOTOPLEVEL),
            414 => Some(Response::ERR_WILDTOPLEVEL),
            415 => Some(Response::ERR_BADMASK),
            417 => Some(Response::ERR_INPUTTOOLONG),
            421 => Some(Response::ERR_UNKNOWNCOMMAND),
            422 => Some(Response::ERR_NOMOTD),
            423 => Some(Response::ERR_NOADMININFO),
            424 => Some(Response::ERR_FILEERROR),
            431 => Some(Response::ERR_NONICKNAMEGIVEN),
            432 => Some(Response::ERR_ERRONEOUSNICKNAME),
            433 => Some(Response::ERR_NICKNAMEINUSE),
            436 => Some(Response::ERR_NICKCOLLISION),
            437 => Some(Response::ERR_UNAVAILRESOURCE),
            441 => Some(Response::ERR_USERNOTINCHANNEL),
            442 => Some(Response::ERR_NOTONCHANNEL),
            443 => Some(Response::ERR_USERONCHANNEL),
            444 => Some(Response::ERR_NOLOGIN),
            445 => Some(Response::ERR_SUMMONDISABLED),
            446 => Some(Response::ERR_USERSDISABLED),
            447 => Some(Response::ERR_NONICKCHANGE),
            451 => Some(Response::ERR_NOTREGISTERED),
            456 => Some(Response::ERR_ACCEPTFULL),
            457 => Some(Response::ERR_ACCEPTEXIST),
            458 => Some(Response::ERR_ACCEPTNOT),
            461 => Some(Response::ERR_NEEDMOREPARAMS),
            462 => Some(Response::ERR_ALREADYREGISTERED),
            463 => Some(Response::ERR_NOPERMFORHOST),
            464 => Some(Response::ERR_PASSWDMISMATCH),
            465 => Some(Response::ERR_YOUREBANNEDCREEP),
            466 => Some(Response::ERR_YOUWILLBEBANNED),
            467 => Some(Response::ERR_KEYSET),
            471 => Some(Response::ERR_CHANNELISFULL),
            472 => Some(Response::ERR_UNKNOWNMODE),
            473 => Some(Response::ERR_INVITEONLYCHAN),
            474 => Some(Response::ERR_BANNEDFROMCHAN),
            475 => Some(Response::ERR_BADCHANNELKEY),
            476 => Some(Response::ERR_BADCHANMASK),
            477 => Some(Response::ERR_NEEDREGGEDNICK),
            478 => Some(Response::ERR_BANLISTFULL),
            479 => Some(Response::ERR_BADCHANNAME),
            481 => Some(Response::ERR_NOPRIVILEGES),
            482 => Some(Response::ERR_CHANOPRIVSNEEDED),
            483 => Some(Response::ERR_CANTKILLSERVER),
            484 => Some(Response::ERR_RESTRICTED),
            485 => Some(Response::ERR_UNIQOPPRIVSNEEDED),
            489 => Some(Response::ERR_SECUREONLYCHAN),
            491 => Some(Response::ERR_NOOPERHOST),
            520 => Some(Response::ERR_OPERONLY),
            501 => Some(Response::ERR_UMODEUNKNOWNFLAG),
            502 => Some(Response::ERR_USERSDONTMATCH),
            511 => Some(Response::ERR_SILELISTFULL),
            524 => Some(Response::ERR_HELPNOTFOUND),
            525 => Some(Response::ERR_INVALIDKEY),
            573 => Some(Response::ERR_CANNOTSENDRP),
            606 => Some(Response::RPL_MAP),
            607 => Some(Response::RPL_MAPEND),
            632 => Some(Response::RPL_RULESTART),
            633 => Some(Response::RPL_RULES),
            634 => Some(Response::RPL_ENDOFRULES),
            635 => Some(Response::ERR_NORULES),
            646 => Some(Response::RPL_STATSPLINE),
            671 => Some(Response::RPL_WHOISSECURE),
            670 => Some(Response::RPL_STARTTLS),
            691 => Some(Response::ERR_STARTTLS),
            696 => Some(Response::ERR_INVALIDMODEPARAM),
            704 => Some(Response::RPL_HELPSTART),
            705 => Some(Response::RPL_HELPTXT),
            706 => Some(Response::RPL_ENDOFHELP),
            710 => Some(Response::RPL_KNOCK),
            711 => Some(Response::RPL_KNOCKDLVR),
            712 => Some(Response::ERR_TOOMANYKNOCK),
            713 => Some(Response::ERR_CHANOPEN),
            714 => Some(Response::ERR_KNOCKONCHAN),
            723 => Some(Response::ERR_NOPRIVS),
            728 => Some(Response::RPL_QUIETLIST),
            729 => Some(Response::RPL_ENDOFQUIETLIST),
            730 => Some(Response::RPL_MONONLINE),
            731 => Some(Response::RPL_MONOFFLINE),
            732 => Some(Response::RPL_MONLIST),
            733 => Some(Response::RPL_ENDOFMONLIST),
            734 => Some(Response::ERR_MONLISTFULL),
            760 => Some(Response::RPL_WHOISKEYVALUE),
            761 => Some(Response::RPL_KEYVALUE),
            762 => Some(Response::RPL_METADATAEND),
            764 => Some(Response::ERR_METADATALIMIT),
            765 => Some(Response::ERR_TARGETINVALID),
            766 => Some(Response::ERR_NOMATCHINGKEY),
            767 => Some(Response::ERR_KEYINVALID),
            768 => Some(Response::ERR_KEYNOTSET),
            769 => Some(Response::ERR_KEYNOPERMISSION),
            900 => Some(Response::RPL_LOGGEDIN),
            901 => Some(Response::RPL_LOGGEDOUT),
            902 => Some(Response::ERR_NICKLOCKED),
            903 => Some(Response::RPL_SASLSUCCESS),
            904 => Some(Response::ERR_SASLFAIL),
            905 => Some(Response::ERR_SASLTOOLONG),
            906 => Some(Response::ERR_SASLABORT),
            907 => Some(Response::ERR_SASLALREADY),
            908 => Some(Response::RPL_SASLMECHS),
            _ => None,
        }
    }

    /// Check if this is an error response (4xx, 5xx, or specific error codes)
    #[inline]
    pub fn is_error(&self) -> bool {
        let code = self.code();
        (400..600).contains(&code)
            || code == 723
            || code == 734
            || (765..=769).contains(&code)
            || code == 902
            || (904..=907).contains(&code)
    }

    /// Check if this is a success/informational response
    #[inline]
    pub fn is_success(&self) -> bool {
        !self.is_error()
    }

    /// Check if this is a connection registration response (001-099)
    #[inline]
    pub fn is_registration(&self) -> bool {
        self.code() < 100
    }

    /// Check if this is a command reply (200-399)
    #[inline]
    pub fn is_reply(&self) -> bool {
        let code = self.code();
        (200..400).contains(&code)
    }

    /// Check if this is a SASL-related response (900-908)
    #[inline]
    pub fn is_sasl(&self) -> bool {
        let code = self.code();
        (900..=908).contains(&code)
    }

    /// Check if this is a channel-related response
    #[inline]
    pub fn is_channel_related(&self) -> bool {
        matches!(
            self,
            Response::RPL_TOPIC
                | Response::RPL_NOTOPIC
                | Response::RPL_TOPICWHOTIME
                | Response::RPL_NAMREPLY
                | Response::RPL_ENDOFNAMES
                | Response::RPL_CHANNELMODEIS
                | Response::RPL_CREATIONTIME
                | Response::RPL_BANLIST
                | Response::RPL_ENDOFBANLIST
                | Response::RPL_EXCEPTLIST
                | Response::RPL_ENDOFEXCEPTLIST
                | Response::RPL_INVITELIST
                | Response::RPL_ENDOFINVITELIST
                | Response::RPL_QUIETLIST
                | Response::RPL_ENDOFQUIETLIST
                | Response::ERR_NOSUCHCHANNEL
                | Response::ERR_CANNOTSENDTOCHAN
                | Response::ERR_TOOMANYCHANNELS
                | Response::ERR_CHANNELISFULL
                | Response::ERR_INVITEONLYCHAN
                | Response::ERR_BANNEDFROMCHAN
                | Response::ERR_BADCHANNELKEY
                | Response::ERR_BADCHANMASK
                | Response::ERR_BADCHANNAME
                | Response::ERR_CHANOPRIVSNEEDED
                | Response::ERR_NOTONCHANNEL
                | Response::ERR_USERNOTINCHANNEL
                | Response::ERR_USERONCHANNEL
                | Response::ERR_NEEDREGGEDNICK
                | Response::ERR_BANLISTFULL
                | Response::ERR_SECUREONLYCHAN
        )
    }

    /// Check if this is a WHOIS/WHOWAS-related response
    #[inline]
    pub fn is_whois_related(&self) -> bool {
        matches!(
            self,
            Response::RPL_WHOISUSER
                | Response::RPL_WHOISSERVER
                | Response::RPL_WHOISOPERATOR
                | Response::RPL_WHOISIDLE
                | Response::RPL_ENDOFWHOIS
                | Response::RPL_WHOISCHANNELS
                | Response::RPL_WHOISACCOUNT
                | Response::RPL_WHOISBOT
                | Response::RPL_WHOISACTUALLY
                | Response::RPL_WHOISHOST
                | Response::RPL_WHOISMODES
                | Response::RPL_WHOISCERTFP
                | Response::RPL_WHOISSECURE
                | Response::RPL_WHOISKEYVALUE
                | Response::RPL_WHOWASUSER
                | Response::RPL_ENDOFWHOWAS
        )
    }

    /// Returns the RFC 2812 category name for this response
    pub fn category(&self) -> &'static str {
        let code = self.code();
        match code {
            1..=99 => "Connection Registration",
            200..=299 => "Command Replies (Trace/Stats)",
            300..=399 => "Command Replies (User/Channel)",
            400..=499 => "Error Replies",
            500..=599 => "Error Replies (Server)",
            600..=699 => "Extended Replies",
            700..=799 => "Extended Replies (IRCv3)",
            900..=999 => "SASL/Account",
            _ => "Unknown",
        }
    }
}

impl FromStr for Response {
    type Err = ParseResponseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let code: u16 = s.parse().map_err(|_| ParseResponseError::InvalidFormat)?;
        Response::from_code(code).ok_or(ParseResponseError::UnknownCode(code))
    }
}

impl std::fmt::Display for Response {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:03}", self.code())
    }
}

/// Error when parsing a response code
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ParseResponseError {
    /// The string was not a valid number
    InvalidFormat,
    /// The numeric code is not a known response
    UnknownCode(u16),
}

impl std::fmt::Display for ParseResponseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidFormat => write!(f, "invalid response code format"),
            Self::UnknownCode(code) => write!(f, "unknown response code: {}", code),
        }
    }
}

impl std::error::Error for ParseResponseError {}

#[cfg(test)]
mod tests {
    use super::*;

    // ============================================================
    // code() tests
    // ============================================================

    #[test]
    fn code_returns_correct_numeric_value() {
        assert_eq!(Response::RPL_WELCOME.code(), 1);
        assert_eq!(Response::RPL_YOURHOST.code(), 2);
        assert_eq!(Response::RPL_CREATED.code(), 3);
        assert_eq!(Response::RPL_MYINFO.code(), 4);
        assert_eq!(Response::RPL_ISUPPORT.code(), 5);
    }

    #[test]
    fn code_returns_correct_error_codes() {
        assert_eq!(Response::ERR_NOSUCHNICK.code(), 401);
        assert_eq!(Response::ERR_NOSUCHCHANNEL.code(), 403);
        assert_eq!(Response::ERR_UNKNOWNCOMMAND.code(), 421);
        assert_eq!(Response::ERR_NICKNAMEINUSE.code(), 433);
    }

    #[test]
    fn code_returns_correct_reply_codes() {
        assert_eq!(Response::RPL_LUSERCLIENT.code(), 251);
        assert_eq!(Response::RPL_LUSEROP.code(), 252);
        assert_eq!(Response::RPL_TOPIC.code(), 332);
        assert_eq!(Response::RPL_NAMREPLY.code(), 353);
    }

    // ============================================================
    // from_code() tests
    // ============================================================

    #[test]
    fn from_code_returns_some_for_known_codes() {
        assert_eq!(Response::from_code(1), Some(Response::RPL_WELCOME));
        assert_eq!(Response::from_code(2), Some(Response::RPL_YOURHOST));
        assert_eq!(Response::from_code(5), Some(Response::RPL_ISUPPORT));
        assert_eq!(Response::from_code(401), Some(Response::ERR_NOSUCHNICK));
        assert_eq!(Response::from_code(433), Some(Response::ERR_NICKNAMEINUSE));
    }

    #[test]
    fn from_code_returns_none_for_unknown_codes() {
        assert_eq!(Response::from_code(9999), None);
        assert_eq!(Response::from_code(0), None);
        assert_eq!(Response::from_code(65535), None);
    }

    #[test]
    fn from_code_roundtrips_with_code() {
        // For any Response, from_code(r.code()) should return Some(r)
        let responses = [
            Response::RPL_WELCOME,
            Response::RPL_YOURHOST,
            Response::ERR_NOSUCHNICK,
            Response::ERR_NOSUCHCHANNEL,
            Response::RPL_TOPIC,
            Response::RPL_WHOISUSER,
        ];
        for r in responses {
            assert_eq!(Response::from_code(r.code()), Some(r));
        }
    }

    // ============================================================
    // is_error() tests
    // ============================================================

    #[test]
    fn is_error_true_for_4xx_codes() {
        assert!(Response::ERR_NOSUCHNICK.is_error()); // 401
        assert!(Response::ERR_NOSUCHCHANNEL.is_error()); // 403
        assert!(Response::ERR_UNKNOWNCOMMAND.is_error()); // 421
        assert!(Response::ERR_NICKNAMEINUSE.is_error()); // 433
        assert!(Response::ERR_NOTONCHANNEL.is_error()); // 442
    }

    #[test]
    fn is_error_true_for_5xx_codes() {
        assert!(Response::ERR_NOPRIVILEGES.is_error()); // 481
        assert!(Response::ERR_CHANOPRIVSNEEDED.is_error()); // 482
    }

    #[test]
    fn is_error_true_for_special_error_codes() {
        // 723 - ERR_NOPRIVS
        assert!(Response::ERR_NOPRIVS.is_error());
        // 902-907 are SASL error codes
        assert!(Response::ERR_NICKLOCKED.is_error()); // 902
        assert!(Response::ERR_SASLFAIL.is_error()); // 904
        assert!(Response::ERR_SASLTOOLONG.is_error()); // 905
        assert!(Response::ERR_SASLABORT.is_error()); // 906
        assert!(Response::ERR_SASLALREADY.is_error()); // 907
    }

    #[test]
    fn is_error_false_for_success_codes() {
        assert!(!Response::RPL_WELCOME.is_error()); // 001
        assert!(!Response::RPL_YOURHOST.is_error()); // 002
        assert!(!Response::RPL_TOPIC.is_error()); // 332
        assert!(!Response::RPL_NAMREPLY.is_error()); // 353
    }

    #[test]
    fn is_error_false_for_sasl_success() {
        assert!(!Response::RPL_LOGGEDIN.is_error()); // 900
        assert!(!Response::RPL_LOGGEDOUT.is_error()); // 901
        assert!(!Response::RPL_SASLSUCCESS.is_error()); // 903
        assert!(!Response::RPL_SASLMECHS.is_error()); // 908
    }

    // ============================================================
    // is_success() tests
    // ============================================================

    #[test]
    fn is_success_inverse_of_is_error() {
        let responses = [
            Response::RPL_WELCOME,
            Response::ERR_NOSUCHNICK,
            Response::RPL_TOPIC,
            Response::ERR_NICKNAMEINUSE,
            Response::RPL_SASLSUCCESS,
            Response::ERR_SASLFAIL,
        ];
        for r in responses {
            assert_eq!(r.is_success(), !r.is_error());
        }
    }

    #[test]
    fn is_success_true_for_welcome_sequence() {
        assert!(Response::RPL_WELCOME.is_success());
        assert!(Response::RPL_YOURHOST.is_success());
        assert!(Response::RPL_CREATED.is_success());
        assert!(Response::RPL_MYINFO.is_success());
        assert!(Response::RPL_ISUPPORT.is_success());
    }

    // ============================================================
    // is_registration() tests
    // ============================================================

    #[test]
    fn is_registration_true_for_sub_100_codes() {
        assert!(Response::RPL_WELCOME.is_registration()); // 001
        assert!(Response::RPL_YOURHOST.is_registration()); // 002
        assert!(Response::RPL_CREATED.is_registration()); // 003
        assert!(Response::RPL_MYINFO.is_registration()); // 004
        assert!(Response::RPL_ISUPPORT.is_registration()); // 005
    }

    #[test]
    fn is_registration_false_for_100_plus_codes() {
        assert!(!Response::RPL_LUSERCLIENT.is_registration()); // 251
        assert!(!Response::RPL_TOPIC.is_registration()); // 332
        assert!(!Response::ERR_NOSUCHNICK.is_registration()); // 401
    }

    // ============================================================
    // is_reply() tests
    // ============================================================

    #[test]
    fn is_reply_true_for_200_to_399_codes() {
        assert!(Response::RPL_TRACELINK.is_reply()); // 200
        assert!(Response::RPL_LUSERCLIENT.is_reply()); // 251
        assert!(Response::RPL_TOPIC.is_reply()); // 332
        assert!(Response::RPL_NAMREPLY.is_reply()); // 353
    }

    #[test]
    fn is_reply_false_for_codes_outside_200_399() {
        assert!(!Response::RPL_WELCOME.is_reply()); // 001
        assert!(!Response::RPL_ISUPPORT.is_reply()); // 005
        assert!(!Response::ERR_NOSUCHNICK.is_reply()); // 401
        assert!(!Response::ERR_NICKNAMEINUSE.is_reply()); // 433
    }

    // ============================================================
    // is_sasl() tests
    // ============================================================

    #[test]
    fn is_sasl_true_for_900_to_908_codes() {
        assert!(Response::RPL_LOGGEDIN.is_sasl()); // 900
        assert!(Response::RPL_LOGGEDOUT.is_sasl()); // 901
        assert!(Response::ERR_NICKLOCKED.is_sasl()); // 902
        assert!(Response::RPL_SASLSUCCESS.is_sasl()); // 903
        assert!(Response::ERR_SASLFAIL.is_sasl()); // 904
        assert!(Response::ERR_SASLTOOLONG.is_sasl()); // 905
        assert!(Response::ERR_SASLABORT.is_sasl()); // 906
        assert!(Response::ERR_SASLALREADY.is_sasl()); // 907
        assert!(Response::RPL_SASLMECHS.is_sasl()); // 908
    }

    #[test]
    fn is_sasl_false_for_non_sasl_codes() {
        assert!(!Response::RPL_WELCOME.is_sasl()); // 001
        assert!(!Response::ERR_NOSUCHNICK.is_sasl()); // 401
        assert!(!Response::RPL_TOPIC.is_sasl()); // 332
    }

    // ============================================================
    // is_channel_related() tests
    // ============================================================

    #[test]
    fn is_channel_related_true_for_channel_replies() {
        assert!(Response::RPL_TOPIC.is_channel_related());
        assert!(Response::RPL_NOTOPIC.is_channel_related());
        assert!(Response::RPL_TOPICWHOTIME.is_channel_related());
        assert!(Response::RPL_NAMREPLY.is_channel_related());
        assert!(Response::RPL_ENDOFNAMES.is_channel_related());
        assert!(Response::RPL_CHANNELMODEIS.is_channel_related());
        assert!(Response::RPL_BANLIST.is_channel_related());
        assert!(Response::RPL_ENDOFBANLIST.is_channel_related());
    }

    #[test]
    fn is_channel_related_true_for_channel_errors() {
        assert!(Response::ERR_NOSUCHCHANNEL.is_channel_related());
        assert!(Response::ERR_CANNOTSENDTOCHAN.is_channel_related());
        assert!(Response::ERR_TOOMANYCHANNELS.is_channel_related());
        assert!(Response::ERR_CHANNELISFULL.is_channel_related());
        assert!(Response::ERR_INVITEONLYCHAN.is_channel_related());
        assert!(Response::ERR_BANNEDFROMCHAN.is_channel_related());
        assert!(Response::ERR_BADCHANNELKEY.is_channel_related());
        assert!(Response::ERR_CHANOPRIVSNEEDED.is_channel_related());
        assert!(Response::ERR_NOTONCHANNEL.is_channel_related());
    }

    #[test]
    fn is_channel_related_false_for_non_channel_responses() {
        assert!(!Response::RPL_WELCOME.is_channel_related());
        assert!(!Response::RPL_YOURHOST.is_channel_related());
        assert!(!Response::ERR_NOSUCHNICK.is_channel_related());
        assert!(!Response::RPL_WHOISUSER.is_channel_related());
    }

    // ============================================================
    // is_whois_related() tests
    // ============================================================

    #[test]
    fn is_whois_related_true_for_whois_replies() {
        assert!(Response::RPL_WHOISUSER.is_whois_related());
        assert!(Response::RPL_WHOISSERVER.is_whois_related());
        assert!(Response::RPL_WHOISOPERATOR.is_whois_related());
        assert!(Response::RPL_WHOISIDLE.is_whois_related());
        assert!(Response::RPL_ENDOFWHOIS.is_whois_related());
        assert!(Response::RPL_WHOISCHANNELS.is_whois_related());
        assert!(Response::RPL_WHOISACCOUNT.is_whois_related());
    }

    #[test]
    fn is_whois_related_true_for_whowas_replies() {
        assert!(Response::RPL_WHOWASUSER.is_whois_related());
        assert!(Response::RPL_ENDOFWHOWAS.is_whois_related());
    }

    #[test]
    fn is_whois_related_false_for_non_whois_responses() {
        assert!(!Response::RPL_WELCOME.is_whois_related());
        assert!(!Response::RPL_TOPIC.is_whois_related());
        assert!(!Response::ERR_NOSUCHNICK.is_whois_related());
        assert!(!Response::RPL_NAMREPLY.is_whois_related());
    }

    // ============================================================
    // category() tests
    // ============================================================

    #[test]
    fn category_connection_registration() {
        assert_eq!(Response::RPL_WELCOME.category(), "Connection Registration");
        assert_eq!(Response::RPL_YOURHOST.category(), "Connection Registration");
        assert_eq!(Response::RPL_ISUPPORT.category(), "Connection Registration");
    }

    #[test]
    fn category_command_replies_trace_stats() {
        assert_eq!(
            Response::RPL_TRACELINK.category(),
            "Command Replies (Trace/Stats)"
        );
        assert_eq!(
            Response::RPL_LUSERCLIENT.category(),
            "Command Replies (Trace/Stats)"
        );
    }

    #[test]
    fn category_command_replies_user_channel() {
        assert_eq!(
            Response::RPL_TOPIC.category(),
            "Command Replies (User/Channel)"
        );
        assert_eq!(
            Response::RPL_NAMREPLY.category(),
            "Command Replies (User/Channel)"
        );
        assert_eq!(
            Response::RPL_WHOISUSER.category(),
            "Command Replies (User/Channel)"
        );
    }

    #[test]
    fn category_error_replies() {
        assert_eq!(Response::ERR_NOSUCHNICK.category(), "Error Replies");
        assert_eq!(Response::ERR_NOSUCHCHANNEL.category(), "Error Replies");
        assert_eq!(Response::ERR_NICKNAMEINUSE.category(), "Error Replies");
    }

    #[test]
    fn category_sasl_account() {
        assert_eq!(Response::RPL_LOGGEDIN.category(), "SASL/Account");
        assert_eq!(Response::RPL_SASLSUCCESS.category(), "SASL/Account");
        assert_eq!(Response::ERR_SASLFAIL.category(), "SASL/Account");
    }

    // ============================================================
    // FromStr tests
    // ============================================================

    #[test]
    fn from_str_parses_valid_codes() {
        assert_eq!("001".parse::<Response>().unwrap(), Response::RPL_WELCOME);
        assert_eq!("1".parse::<Response>().unwrap(), Response::RPL_WELCOME);
        assert_eq!("401".parse::<Response>().unwrap(), Response::ERR_NOSUCHNICK);
        assert_eq!(
            "433".parse::<Response>().unwrap(),
            Response::ERR_NICKNAMEINUSE
        );
    }

    #[test]
    fn from_str_error_for_invalid_format() {
        assert_eq!(
            "abc".parse::<Response>().unwrap_err(),
            ParseResponseError::InvalidFormat
        );
        assert_eq!(
            "".parse::<Response>().unwrap_err(),
            ParseResponseError::InvalidFormat
        );
    }

    #[test]
    fn from_str_error_for_unknown_code() {
        assert_eq!(
            "9999".parse::<Response>().unwrap_err(),
            ParseResponseError::UnknownCode(9999)
        );
    }

    // ============================================================
    // Display tests
    // ============================================================

    #[test]
    fn display_formats_with_leading_zeros() {
        assert_eq!(format!("{}", Response::RPL_WELCOME), "001");
        assert_eq!(format!("{}", Response::RPL_YOURHOST), "002");
        assert_eq!(format!("{}", Response::RPL_ISUPPORT), "005");
    }

    #[test]
    fn display_formats_three_digit_codes() {
        assert_eq!(format!("{}", Response::ERR_NOSUCHNICK), "401");
        assert_eq!(format!("{}", Response::ERR_NICKNAMEINUSE), "433");
        assert_eq!(format!("{}", Response::RPL_TOPIC), "332");
    }

    // ============================================================
    // ParseResponseError tests
    // ============================================================

    #[test]
    fn parse_response_error_display() {
        assert_eq!(
            ParseResponseError::InvalidFormat.to_string(),
            "invalid response code format"
        );
        assert_eq!(
            ParseResponseError::UnknownCode(9999).to_string(),
            "unknown response code: 9999"
        );
    }

    #[test]
    fn parse_response_error_is_error_trait() {
        // Ensure it implements std::error::Error
        fn assert_error<E: std::error::Error>(_: &E) {}
        assert_error(&ParseResponseError::InvalidFormat);
        assert_error(&ParseResponseError::UnknownCode(0));
    }
}
